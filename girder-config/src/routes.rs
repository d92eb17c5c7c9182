// Declarative route configuration (routes.yaml)

use crate::loader::{load_yaml, parse_yaml};
use crate::Result;
use girder_core::RouteSpec;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::collections::HashMap;
use tracing::debug;

/// One route entry as written in YAML. The route name is the mapping key.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteDef {
    pub path: String,
    pub methods: Vec<String>,
    pub controller: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// The whole routes file: a mapping from route name to definition.
///
/// ```yaml
/// add:
///   path: /add/{a}/{b}
///   methods: [GET]
///   controller: controller.MathController::Add
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutesConfig {
    #[serde(flatten)]
    pub routes: BTreeMap<String, RouteDef>,
}

impl RoutesConfig {
    pub fn from_str(data: &str) -> Result<Self> {
        parse_yaml(data)
    }

    /// Flatten into route specs, carrying the mapping key as the route name.
    pub fn to_specs(&self) -> Vec<RouteSpec> {
        self.routes
            .iter()
            .map(|(name, def)| RouteSpec {
                name: name.clone(),
                path: def.path.clone(),
                methods: def.methods.clone(),
                controller: def.controller.clone(),
                headers: def.headers.clone(),
            })
            .collect()
    }
}

/// Load `routes.yaml` from the configuration directory.
pub fn load_routes() -> Result<Vec<RouteSpec>> {
    let config: RoutesConfig = load_yaml("routes.yaml")?;
    debug!(routes = config.routes.len(), "Loaded route configuration");
    Ok(config.to_specs())
}
