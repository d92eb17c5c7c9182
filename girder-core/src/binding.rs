// Textual method bindings used by route and pub/sub configuration

use crate::Error;

/// A `package.Type::Method` reference from configuration.
///
/// Parsed once at startup and resolved against controller tables; never
/// used for reflection at request time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub package: String,
    pub type_name: String,
    pub method: String,
}

impl Binding {
    /// Parse a method definition of the form `<package>.<Type>::<Method>`.
    pub fn parse(def: &str) -> Result<Self, Error> {
        let (service, method) = def.split_once("::").ok_or_else(|| {
            Error::RouteBinding(format!(
                "invalid binding '{def}': expected package.Type::Method"
            ))
        })?;
        let (package, type_name) = service.split_once('.').ok_or_else(|| {
            Error::RouteBinding(format!(
                "invalid binding '{def}': service must be package.Type"
            ))
        })?;
        if package.is_empty() || type_name.is_empty() || method.is_empty() {
            return Err(Error::RouteBinding(format!(
                "invalid binding '{def}': empty component"
            )));
        }

        Ok(Self {
            package: package.to_string(),
            type_name: type_name.to_string(),
            method: method.to_string(),
        })
    }

    /// The fully qualified service name (`package.Type`).
    pub fn service(&self) -> String {
        format!("{}.{}", self.package, self.type_name)
    }
}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.service(), self.method)
    }
}
