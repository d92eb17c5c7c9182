// Configuration loading for the Girder framework.
//
// Routes and pub/sub subscriptions are declared in YAML files under
// `$CONFIG_DIR/config/`; process settings come from the environment, with
// optional `.env` support.

pub mod env;
pub mod error;
pub mod loader;
pub mod pubsub;
pub mod routes;

pub use env::{load_dotenv, var, var_or};
pub use error::{ConfigError, Result};
pub use loader::{CONFIG_DIR_VAR, config_path, load_yaml, parse_yaml};
pub use pubsub::{PubSubConfig, load_pubsub};
pub use routes::{RouteDef, RoutesConfig, load_routes};
