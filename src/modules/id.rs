//! Namespaced module identifiers.

use std::fmt;

use serde::Serialize;

use crate::error::RegistryError;

/// Dot-segmented module identifier, e.g. `http.handlers.static_response`.
///
/// The namespace is everything before the last dot; a single-segment id
/// (`http`) sits in the empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    /// Wrap an id without validating it. Lookups of malformed ids simply miss.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Validate an id for registration.
    pub fn parse(id: &str) -> Result<Self, RegistryError> {
        let well_formed = !id.is_empty()
            && id.split('.').all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            });
        if well_formed {
            Ok(Self(id.to_string()))
        } else {
            Err(RegistryError::Malformed(id.to_string()))
        }
    }

    /// Build `namespace.name`, or just `name` for the empty namespace.
    pub fn join(namespace: &str, name: &str) -> Self {
        if namespace.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{}.{}", namespace, name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn namespace(&self) -> &str {
        self.0.rsplit_once('.').map(|(ns, _)| ns).unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.0.rsplit_once('.').map(|(_, name)| name).unwrap_or(&self.0)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ModuleId::parse("http.handlers.static_response").is_ok());
        assert!(ModuleId::parse("http").is_ok());

        for bad in ["", ".http", "http.", "http..handlers", "http.hand lers", "http/handlers"] {
            assert!(ModuleId::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_namespace_and_name() {
        let id = ModuleId::new("http.matchers.path");
        assert_eq!(id.namespace(), "http.matchers");
        assert_eq!(id.name(), "path");

        let app = ModuleId::join("", "http");
        assert_eq!(app.as_str(), "http");
        assert_eq!(app.namespace(), "");
        assert_eq!(app.name(), "http");
    }
}
