// End-to-end tests: configuration-declared routes dispatched through the
// container, content negotiation, SOAP, and event fan-out.

use girder::prelude::*;
use girder::{EventMetadata, girder_config::{PubSubConfig, RoutesConfig}};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename = "Point")]
struct Point {
    x: i32,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateUser {
    name: String,
}

#[derive(Debug, Clone)]
struct UserCreated {
    metadata: EventMetadata,
    name: String,
}

impl UserCreated {
    fn new(name: &str) -> Self {
        Self {
            metadata: EventMetadata::new("user_created"),
            name: name.to_string(),
        }
    }
}

impl Event for UserCreated {
    fn event_name(&self) -> &str {
        &self.metadata.name
    }

    fn event_id(&self) -> uuid::Uuid {
        self.metadata.id
    }

    fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        self.metadata.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

struct UserRepository {
    users: Vec<String>,
}

struct UserService {
    repository: Arc<UserRepository>,
}

impl UserService {
    fn find(&self, name: &str) -> Option<&String> {
        self.repository.users.iter().find(|u| *u == name)
    }
}

struct UserController {
    service: Arc<UserService>,
    bus: Arc<EventBus>,
    welcomed: Arc<Mutex<Vec<String>>>,
}

impl Controller for UserController {
    fn name(&self) -> &'static str {
        "controller.UserController"
    }

    fn handlers(self: Arc<Self>) -> Vec<HandlerEntry> {
        let this = self.clone();
        let add = HandlerEntry::new(
            "Add",
            &[ParamKind::Int, ParamKind::Int],
            |ctx: girder::Context, args: PathArgs| async move {
                let sum = args.int("a")? + args.int("b")?;
                ctx.ok(&Point { x: sum as i32 })
            },
        );

        let get_user = HandlerEntry::new(
            "GetUser",
            &[ParamKind::Str],
            move |ctx: girder::Context, args: PathArgs| {
                let this = this.clone();
                async move {
                    let name = args.str("name")?.to_string();
                    match this.service.find(&name) {
                        Some(user) => ctx.ok(&serde_json::json!({ "user": user })),
                        None => Err(Error::NotFound(format!("no user named {name}"))),
                    }
                }
            },
        );

        let this = self.clone();
        let create = HandlerEntry::new(
            "CreateUser",
            &[],
            move |ctx: girder::Context, _args: PathArgs| {
                let this = this.clone();
                async move {
                    let body: CreateUser = ctx.bind()?;
                    this.bus.dispatch(UserCreated::new(&body.name)).await;
                    ctx.ok(&serde_json::json!({ "created": body.name }))
                }
            },
        );

        let echo = HandlerEntry::new(
            "EchoPoint",
            &[],
            |ctx: girder::Context, _args: PathArgs| async move {
                let point: Point = ctx.bind()?;
                ctx.ok(&point)
            },
        );

        vec![add, get_user, create, echo]
    }

    fn subscriptions(self: Arc<Self>) -> Vec<SubscriptionDef> {
        let welcomed = self.welcomed.clone();
        vec![SubscriptionDef::new(
            "OnUserCreated",
            move |event: Arc<UserCreated>| {
                let welcomed = welcomed.clone();
                async move {
                    welcomed.lock().unwrap().push(event.name.clone());
                }
            },
        )]
    }
}

const ROUTES: &str = r#"
add:
  path: /add/{a}/{b}
  methods: [GET]
  controller: controller.UserController::Add
user:
  path: /users/{name}
  methods: [GET]
  controller: controller.UserController::GetUser
create:
  path: /users
  methods: [POST]
  controller: controller.UserController::CreateUser
echo:
  path: /echo
  methods: [POST]
  controller: controller.UserController::EchoPoint
"#;

const PUBSUB: &str = "handlers:\n  - controller.UserController::OnUserCreated\n";

fn build_app() -> (Application, Arc<Mutex<Vec<String>>>) {
    let welcomed = Arc::new(Mutex::new(Vec::new()));

    let mut app = Application::new();
    let container = app.container();
    container.register(|_| {
        Ok(UserRepository {
            users: vec!["alice".to_string(), "bob".to_string()],
        })
    });
    container.register(|c: &Container| {
        Ok(UserService {
            repository: c.resolve()?,
        })
    });

    let w = welcomed.clone();
    container.register_controller(move |c: &Container| {
        Ok(UserController {
            service: c.resolve()?,
            bus: c.resolve()?,
            welcomed: w.clone(),
        })
    });

    let specs = RoutesConfig::from_str(ROUTES).unwrap().to_specs();
    app.bind_routes(&specs).unwrap();

    let pubsub = PubSubConfig::from_str(PUBSUB).unwrap();
    app.init_subscriptions(&pubsub.handlers).unwrap();

    (app, welcomed)
}

fn json_body(res: &HttpResponse) -> serde_json::Value {
    serde_json::from_slice(&res.body).unwrap()
}

#[tokio::test]
async fn add_route_coerces_path_parameters() {
    let (app, _) = build_app();
    let res = app.handle(HttpRequest::new("GET", "/add/3/4")).await;
    assert_eq!(res.status, 200);
    assert_eq!(json_body(&res)["x"], 7);
}

#[tokio::test]
async fn non_numeric_path_parameter_is_400() {
    let (app, _) = build_app();
    let res = app.handle(HttpRequest::new("GET", "/add/x/4")).await;
    assert_eq!(res.status, 400);
    assert!(json_body(&res)["error"].as_str().unwrap().contains("'x'"));
}

#[tokio::test]
async fn default_response_is_json() {
    let (app, _) = build_app();
    let res = app.handle(HttpRequest::new("GET", "/add/3/4")).await;
    assert_eq!(
        res.headers.get("content-type").map(String::as_str),
        Some("application/json")
    );
    assert_eq!(res.body, br#"{"x":7}"#.to_vec());
}

#[tokio::test]
async fn accept_header_selects_xml() {
    let (app, _) = build_app();
    let mut req = HttpRequest::new("GET", "/add/3/4");
    req.set_header("Accept", "application/xml");

    let res = app.handle(req).await;
    assert_eq!(res.status, 200);
    assert_eq!(
        res.headers.get("content-type").map(String::as_str),
        Some("application/xml")
    );
    let body = String::from_utf8(res.body).unwrap();
    let point: Point = quick_xml::de::from_str(&body).unwrap();
    assert_eq!(point, Point { x: 7 });
}

#[tokio::test]
async fn handler_error_maps_to_404_with_canonical_body() {
    let (app, _) = build_app();
    let res = app.handle(HttpRequest::new("GET", "/users/mallory")).await;
    assert_eq!(res.status, 404);
    assert!(res.headers.contains_key("x-request-id"));
    assert!(
        json_body(&res)["error"]
            .as_str()
            .unwrap()
            .contains("mallory")
    );
}

#[tokio::test]
async fn known_user_is_returned() {
    let (app, _) = build_app();
    let res = app.handle(HttpRequest::new("GET", "/users/alice")).await;
    assert_eq!(res.status, 200);
    assert_eq!(json_body(&res)["user"], "alice");
}

#[tokio::test]
async fn soap_request_round_trips() {
    let (app, _) = build_app();

    let envelope = concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
        "<Envelope xmlns=\"http://www.w3.org/2003/05/soap-envelope\">",
        "<Body><Point><x>41</x></Point></Body></Envelope>"
    );
    let mut req = HttpRequest::new("POST", "/echo");
    req.set_header("Content-Type", "text/xml");
    req.set_header("SOAPAction", "EchoPoint");
    req.body = envelope.as_bytes().to_vec();

    let res = app.handle(req).await;
    assert_eq!(res.status, 200);
    assert_eq!(
        res.headers.get("content-type").map(String::as_str),
        Some("text/xml")
    );

    // The response is itself a well-formed envelope wrapping the point.
    #[derive(Debug, Deserialize)]
    struct EnvelopeView {
        #[serde(rename = "SOAP-ENV:Body")]
        body: BodyView,
    }
    #[derive(Debug, Deserialize)]
    struct BodyView {
        #[serde(rename = "Point")]
        point: Point,
    }

    let body = String::from_utf8(res.body).unwrap();
    let envelope: EnvelopeView = quick_xml::de::from_str(&body).unwrap();
    assert_eq!(envelope.body.point, Point { x: 41 });
}

#[tokio::test]
async fn malformed_body_is_400() {
    let (app, _) = build_app();
    let mut req = HttpRequest::new("POST", "/users");
    req.body = b"{broken".to_vec();

    let res = app.handle(req).await;
    assert_eq!(res.status, 400);
}

#[tokio::test]
async fn created_user_event_reaches_subscriber() {
    let (app, welcomed) = build_app();

    let mut req = HttpRequest::new("POST", "/users");
    req.body = br#"{"name": "carol"}"#.to_vec();
    let res = app.handle(req).await;
    assert_eq!(res.status, 200);

    // Fan-out is asynchronous; wait for the subscriber.
    for _ in 0..100 {
        if !welcomed.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*welcomed.lock().unwrap(), vec!["carol".to_string()]);
}

#[tokio::test]
async fn services_are_singletons() {
    let (app, _) = build_app();
    let first = app.container().resolve::<UserService>().unwrap();
    let second = app.container().resolve::<UserService>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn binding_to_unknown_handler_is_startup_fatal() {
    let mut app = Application::new();
    app.container()
        .register_controller(|_| {
            Ok(UserController {
                service: Arc::new(UserService {
                    repository: Arc::new(UserRepository { users: vec![] }),
                }),
                bus: Arc::new(EventBus::new()),
                welcomed: Arc::new(Mutex::new(Vec::new())),
            })
        });

    let specs = RoutesConfig::from_str(
        "bad:\n  path: /x\n  methods: [GET]\n  controller: controller.UserController::Nope\n",
    )
    .unwrap()
    .to_specs();

    assert!(app.bind_routes(&specs).is_err());
}
