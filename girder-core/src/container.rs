// Dependency injection container

use crate::{Controller, Error, HandlerEntry};
use girder_events::SubscriptionDef;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

type AnyInstance = Arc<dyn Any + Send + Sync>;
type ConstructorFn = Box<dyn Fn(&Container) -> Result<AnyInstance, Error> + Send + Sync>;
type GroupResolver = Box<dyn Fn(&Container) -> Result<Arc<dyn Controller>, Error> + Send + Sync>;

/// Group tag under which controllers are registered so the router can
/// enumerate them without naming each one.
pub const GROUP_CONTROLLER: &str = "controller";

struct Registration {
    type_name: &'static str,
    constructor: ConstructorFn,
    /// Memoized singleton. `get_or_try_init` guarantees the constructor runs
    /// exactly once even under concurrent first access; later resolutions
    /// are lock-free Arc clones.
    instance: OnceCell<AnyInstance>,
}

thread_local! {
    // Per-thread resolution stack for cycle detection.
    static RESOLVING: RefCell<Vec<(TypeId, &'static str)>> = const { RefCell::new(Vec::new()) };
}

/// The dependency injection container.
///
/// Services are registered as lazy constructors keyed by the type they
/// produce. A constructor receives the container and resolves its own
/// dependencies, so the dependency graph is built depth-first on first
/// demand and every service is a process-wide singleton.
#[derive(Clone, Default)]
pub struct Container {
    registrations: Arc<RwLock<HashMap<TypeId, Arc<Registration>>>>,
    groups: Arc<RwLock<HashMap<&'static str, Vec<GroupResolver>>>>,
}

impl Container {
    pub fn new() -> Self {
        debug!("Creating new DI container");
        Self::default()
    }

    /// Register a lazy constructor for `T`.
    ///
    /// Panics on duplicate registration: wiring happens at startup and a
    /// conflicting constructor is a broken deployment, not a recoverable
    /// condition.
    pub fn register<T, F>(&self, constructor: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, Error> + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<T>();
        let registration = Registration {
            type_name,
            constructor: Box::new(move |c| Ok(Arc::new(constructor(c)?) as AnyInstance)),
            instance: OnceCell::new(),
        };

        let mut registrations = self.registrations.write();
        if registrations
            .insert(TypeId::of::<T>(), Arc::new(registration))
            .is_some()
        {
            panic!("duplicate constructor registered for {type_name}");
        }

        debug!(service = type_name, "Constructor registered");
    }

    /// Register an already-constructed singleton.
    pub fn register_instance<T: Send + Sync + 'static>(&self, instance: T) {
        let shared: AnyInstance = Arc::new(instance);
        let cell = OnceCell::new();
        let _ = cell.set(shared.clone());

        let type_name = std::any::type_name::<T>();
        let registration = Registration {
            type_name,
            constructor: Box::new(move |_| Ok(shared.clone())),
            instance: cell,
        };

        let mut registrations = self.registrations.write();
        if registrations
            .insert(TypeId::of::<T>(), Arc::new(registration))
            .is_some()
        {
            panic!("duplicate constructor registered for {type_name}");
        }

        debug!(service = type_name, "Instance registered");
    }

    /// Register a controller constructor under a group tag.
    ///
    /// Grouped services resolve like any other, and are additionally
    /// enumerable through [`Container::group`] for late-bound initializers
    /// such as the router.
    pub fn register_grouped<T, F>(&self, group: &'static str, constructor: F)
    where
        T: Controller + 'static,
        F: Fn(&Container) -> Result<T, Error> + Send + Sync + 'static,
    {
        self.register::<T, F>(constructor);
        self.groups
            .write()
            .entry(group)
            .or_default()
            .push(Box::new(|c: &Container| {
                let instance = c.resolve::<T>()?;
                Ok(instance as Arc<dyn Controller>)
            }));
    }

    /// Register a controller under the default `controller` group.
    pub fn register_controller<T, F>(&self, constructor: F)
    where
        T: Controller + 'static,
        F: Fn(&Container) -> Result<T, Error> + Send + Sync + 'static,
    {
        self.register_grouped::<T, F>(GROUP_CONTROLLER, constructor);
    }

    /// Resolve a singleton by type, constructing it (and its dependency
    /// graph, depth-first) on first demand.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        let type_name = std::any::type_name::<T>();
        let instance = self.resolve_by_id(TypeId::of::<T>(), type_name)?;
        instance
            .downcast::<T>()
            .map_err(|_| Error::Resolution(format!("constructor for {type_name} produced an unexpected type")))
    }

    fn resolve_by_id(&self, type_id: TypeId, requested: &str) -> Result<AnyInstance, Error> {
        trace!(service = requested, "Resolving service");

        let registration = self
            .registrations
            .read()
            .get(&type_id)
            .cloned()
            .ok_or_else(|| {
                Error::Resolution(format!("no constructor registered for {requested}"))
            })?;

        if let Some(instance) = registration.instance.get() {
            return Ok(instance.clone());
        }

        let cycle = RESOLVING.with(|stack| {
            let stack = stack.borrow();
            if stack.iter().any(|(id, _)| *id == type_id) {
                let mut chain: Vec<&str> = stack.iter().map(|(_, name)| *name).collect();
                chain.push(requested);
                Some(chain.join(" -> "))
            } else {
                None
            }
        });
        if let Some(chain) = cycle {
            return Err(Error::CircularDependency(chain));
        }

        RESOLVING.with(|stack| stack.borrow_mut().push((type_id, registration.type_name)));
        let result = registration
            .instance
            .get_or_try_init(|| (registration.constructor)(self))
            .cloned();
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });

        if result.is_ok() {
            debug!(service = registration.type_name, "Service resolved");
        }
        result
    }

    /// Run a bootstrap function against the container.
    ///
    /// The function resolves whatever services it needs without itself being
    /// registered as one; resolution failures surface as startup errors.
    pub fn invoke<F, R>(&self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&Container) -> Result<R, Error>,
    {
        f(self)
    }

    /// Resolve every service registered under a group tag.
    pub fn group(&self, group: &str) -> Result<Vec<Arc<dyn Controller>>, Error> {
        let groups = self.groups.read();
        let Some(resolvers) = groups.get(group) else {
            return Ok(Vec::new());
        };
        resolvers.iter().map(|resolve| resolve(self)).collect()
    }

    /// Resolve every registered controller.
    pub fn controllers(&self) -> Result<Vec<Arc<dyn Controller>>, Error> {
        self.group(GROUP_CONTROLLER)
    }

    /// Look up a named request handler on a named controller.
    ///
    /// `service` is the controller's declared name (`package.Type`); the
    /// handler comes from its compile-time handler table.
    pub fn method(&self, service: &str, method: &str) -> Result<HandlerEntry, Error> {
        for controller in self.controllers()? {
            if controller.name() == service {
                return controller
                    .handlers()
                    .into_iter()
                    .find(|entry| entry.name == method)
                    .ok_or_else(|| {
                        Error::RouteBinding(format!("{service} has no handler named {method}"))
                    });
            }
        }
        Err(Error::Resolution(format!("no controller registered as {service}")))
    }

    /// Look up a named event subscription on a named controller.
    pub fn subscription(&self, service: &str, method: &str) -> Result<SubscriptionDef, Error> {
        for controller in self.controllers()? {
            if controller.name() == service {
                return controller
                    .subscriptions()
                    .into_iter()
                    .find(|sub| sub.name() == method)
                    .ok_or_else(|| {
                        Error::RouteBinding(format!(
                            "{service} has no subscription named {method}"
                        ))
                    });
            }
        }
        Err(Error::Resolution(format!("no controller registered as {service}")))
    }

    /// Check if a constructor is registered for `T`.
    pub fn has<T: Send + Sync + 'static>(&self) -> bool {
        self.registrations.read().contains_key(&TypeId::of::<T>())
    }
}
