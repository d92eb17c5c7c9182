// Declarative route table, path-parameter coercion, and request dispatch

use crate::binding::Binding;
use crate::container::Container;
use crate::context::Context;
use crate::traits::HandlerEntry;
use crate::{Error, HttpMethod, HttpRequest, HttpResponse};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use smallvec::SmallVec;
use std::collections::HashMap;
use tracing::{debug, info};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^{}]+)\}").unwrap());

/// Declared kind of a path parameter. The dispatcher coerces the raw path
/// segment to this kind before the handler runs; a mismatch is a 400 and
/// the handler is never invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Str,
    Int,
    Int32,
    Int64,
}

impl ParamKind {
    fn coerce(self, name: &str, raw: &str) -> Result<PathArg, Error> {
        match self {
            ParamKind::Str => Ok(PathArg::Str(raw.to_string())),
            ParamKind::Int | ParamKind::Int64 => raw
                .parse::<i64>()
                .map(PathArg::Int)
                .map_err(|_| conversion(name, raw, "integer")),
            ParamKind::Int32 => raw
                .parse::<i32>()
                .map(PathArg::Int32)
                .map_err(|_| conversion(name, raw, "32-bit integer")),
        }
    }
}

fn conversion(name: &str, raw: &str, kind: &str) -> Error {
    Error::Conversion(format!("path parameter '{name}': '{raw}' is not a valid {kind}"))
}

/// A coerced path argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathArg {
    Str(String),
    Int(i64),
    Int32(i32),
}

/// The coerced path arguments for one request, in placeholder order.
#[derive(Debug, Clone, Default)]
pub struct PathArgs {
    args: SmallVec<[(String, PathArg); 4]>,
}

impl PathArgs {
    pub fn get(&self, name: &str) -> Option<&PathArg> {
        self.args
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, arg)| arg)
    }

    pub fn str(&self, name: &str) -> Result<&str, Error> {
        match self.get(name) {
            Some(PathArg::Str(s)) => Ok(s),
            Some(other) => Err(wrong_kind(name, "string", other)),
            None => Err(missing(name)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, Error> {
        match self.get(name) {
            Some(PathArg::Int(v)) => Ok(*v),
            Some(other) => Err(wrong_kind(name, "integer", other)),
            None => Err(missing(name)),
        }
    }

    pub fn int32(&self, name: &str) -> Result<i32, Error> {
        match self.get(name) {
            Some(PathArg::Int32(v)) => Ok(*v),
            Some(other) => Err(wrong_kind(name, "32-bit integer", other)),
            None => Err(missing(name)),
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

fn missing(name: &str) -> Error {
    Error::Conversion(format!("no path parameter named '{name}'"))
}

fn wrong_kind(name: &str, expected: &str, got: &PathArg) -> Error {
    Error::Conversion(format!(
        "path parameter '{name}' is not declared as {expected} (got {got:?})"
    ))
}

/// A declarative route from configuration: path pattern with `{var}`
/// placeholders, accepted methods, required headers, and a
/// `package.Type::Method` handler reference.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteSpec {
    #[serde(default)]
    pub name: String,
    pub path: String,
    pub methods: Vec<String>,
    pub controller: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// A route bound to its resolved handler.
pub struct Route {
    pub name: String,
    pub path: String,
    pub methods: Vec<HttpMethod>,
    pub headers: HashMap<String, String>,
    /// Placeholder names in pattern order; positionally aligned with the
    /// handler's declared parameter kinds.
    pub vars: Vec<String>,
    pub entry: HandlerEntry,
}

/// Extract `{var}` placeholder names from a path pattern, in order.
pub fn path_vars(pattern: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(pattern)
        .map(|cap| cap[1].to_string())
        .collect()
}

/// Router binding declarative routes to container-resolved handlers and
/// dispatching requests to them.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind one configured route, resolving its controller through the
    /// container and validating the placeholder list against the handler's
    /// declared parameters. Any failure here is a broken deployment and
    /// surfaces as a startup error.
    pub fn bind(&mut self, spec: &RouteSpec, container: &Container) -> Result<(), Error> {
        let binding = Binding::parse(&spec.controller)?;
        let entry = container.method(&binding.service(), &binding.method)?;

        let vars = path_vars(&spec.path);
        if vars.len() != entry.params.len() {
            return Err(Error::RouteBinding(format!(
                "route '{}': path {} declares {} placeholder(s) but {} takes {}",
                spec.name,
                spec.path,
                vars.len(),
                binding,
                entry.params.len()
            )));
        }

        let mut methods = Vec::with_capacity(spec.methods.len());
        for m in &spec.methods {
            let method = HttpMethod::from_str(m).ok_or_else(|| {
                Error::RouteBinding(format!("route '{}': unknown HTTP method {m}", spec.name))
            })?;
            methods.push(method);
        }

        info!(route = %spec.name, path = %spec.path, handler = %binding, "Route bound");
        self.routes.push(Route {
            name: spec.name.clone(),
            path: spec.path.clone(),
            methods,
            headers: spec.headers.clone(),
            vars,
            entry,
        });
        Ok(())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Dispatch one request: match a route, coerce its path parameters,
    /// invoke the handler, and render the buffered response. Errors never
    /// escape; they are translated to responses here.
    pub async fn dispatch(&self, mut request: HttpRequest) -> HttpResponse {
        let (path, query) = match request.path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (request.path.clone(), None),
        };
        if let Some(query) = query {
            request.query_params = parse_query_string(&query);
        }

        let Some((route, params)) = self.match_request(&request, &path) else {
            let label = format!("no route matches {} {path}", request.method.to_uppercase());
            let ctx = Context::new(request);
            ctx.send_error(&Error::NotFound(label));
            return ctx.finish();
        };
        debug!(route = %route.name, path = %path, "Matched route");

        request.path_params = params;
        let ctx = Context::new(request);

        let args = match coerce_args(route, &ctx) {
            Ok(args) => args,
            Err(err) => {
                ctx.send_error(&err);
                return ctx.finish();
            }
        };

        if let Err(err) = (route.entry.handler)(ctx.clone(), args).await {
            ctx.send_error(&err);
        }
        ctx.finish()
    }

    fn match_request<'a>(
        &'a self,
        request: &HttpRequest,
        path: &str,
    ) -> Option<(&'a Route, HashMap<String, String>)> {
        let method = HttpMethod::from_str(&request.method)?;
        for route in &self.routes {
            if !route.methods.contains(&method) {
                continue;
            }
            if !route
                .headers
                .iter()
                .all(|(name, value)| request.header(name) == Some(value.as_str()))
            {
                continue;
            }
            if let Some(params) = match_path(&route.path, path) {
                return Some((route, params));
            }
        }
        None
    }
}

/// Coerce raw path values against the handler's declared parameter kinds,
/// in placeholder order.
fn coerce_args(route: &Route, ctx: &Context) -> Result<PathArgs, Error> {
    let mut args = PathArgs::default();
    for (var, kind) in route.vars.iter().zip(route.entry.params.iter()) {
        let raw = ctx
            .request()
            .param(var)
            .ok_or_else(|| Error::Conversion(format!("no path parameter named '{var}'")))?;
        args.args.push((var.clone(), kind.coerce(var, raw)?));
    }
    Ok(args)
}

/// Match a `{var}` path pattern against a request path, returning the raw
/// captured segments on success.
fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (pattern_part, path_part) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(var) = pattern_part
            .strip_prefix('{')
            .and_then(|p| p.strip_suffix('}'))
        {
            params.insert(var.to_string(), path_part.to_string());
        } else if pattern_part != path_part {
            return None;
        }
    }

    Some(params)
}

/// Parse a query string into a map of parameters
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let mut split = part.splitn(2, '=');
            let key = split.next()?;
            let value = split.next().unwrap_or("");
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
