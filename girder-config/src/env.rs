// Environment variable loading

use std::env;

/// Load variables from a `.env` file into the process environment, if one
/// exists. Missing files are fine; a present-but-broken file is logged.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
        Err(err) if err.not_found() => {}
        Err(err) => tracing::warn!(error = %err, "Failed to load .env file"),
    }
}

/// Read an environment variable.
pub fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Read an environment variable with a fallback.
pub fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_or_falls_back() {
        assert_eq!(var_or("GIRDER_NONEXISTENT_VAR_12345", "fallback"), "fallback");
    }

    #[test]
    fn test_missing_var_is_none() {
        assert!(var("GIRDER_NONEXISTENT_VAR_67890").is_none());
    }
}
