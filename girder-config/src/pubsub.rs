// Pub/sub subscription configuration (pubsub.yaml)

use crate::loader::{load_yaml, parse_yaml};
use crate::Result;
use serde::Deserialize;
use tracing::debug;

/// The pub/sub file: a list of `package.Type::Method` bindings
/// auto-subscribed at startup.
///
/// ```yaml
/// handlers:
///   - controller.UserController::OnUserCreated
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PubSubConfig {
    #[serde(default)]
    pub handlers: Vec<String>,
}

impl PubSubConfig {
    pub fn from_str(data: &str) -> Result<Self> {
        parse_yaml(data)
    }
}

/// Load `pubsub.yaml` from the configuration directory.
pub fn load_pubsub() -> Result<PubSubConfig> {
    let config: PubSubConfig = load_yaml("pubsub.yaml")?;
    debug!(handlers = config.handlers.len(), "Loaded pub/sub configuration");
    Ok(config)
}
