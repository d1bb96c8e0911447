//! Built-in module table.

use crate::config::FileLoader;
use crate::error::RegistryError;
use crate::http::handlers::{Headers, ReverseProxy, Rewrite, StaticError, StaticResponse};
use crate::http::HttpApp;
use crate::modules::RegistryBuilder;
use crate::observability::logging::{
    ConsoleEncoder, DiscardWriter, FileWriter, JsonEncoder, StderrWriter, StdoutWriter,
};
use crate::routing::{MatchHeader, MatchHost, MatchMethod, MatchPath};
use crate::storage::MemoryStorage;

/// A builder with every built-in module registered. Callers may register
/// their own modules before sealing.
pub fn standard_registry() -> Result<RegistryBuilder, RegistryError> {
    let mut builder = RegistryBuilder::new();
    builder
        .register(HttpApp::info())?
        .register(MatchPath::info())?
        .register(MatchMethod::info())?
        .register(MatchHost::info())?
        .register(MatchHeader::info())?
        .register(StaticResponse::info())?
        .register(Headers::info())?
        .register(Rewrite::info())?
        .register(StaticError::info())?
        .register(ReverseProxy::info())?
        .register(MemoryStorage::info())?
        .register(StdoutWriter::info())?
        .register(StderrWriter::info())?
        .register(DiscardWriter::info())?
        .register(FileWriter::info())?
        .register(JsonEncoder::info())?
        .register(ConsoleEncoder::info())?
        .register(FileLoader::info())?;
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_modules_registered() {
        let registry = standard_registry().unwrap().seal();
        assert_eq!(registry.len(), 18);
        assert!(registry.contains("http"));
        assert!(registry.contains("http.handlers.reverse_proxy"));
        assert!(registry.contains("logging.encoders.console"));
        assert!(registry.contains("config_loaders.file"));

        let matchers: Vec<String> = registry
            .modules_in("http.matchers")
            .iter()
            .map(|info| info.id.to_string())
            .collect();
        assert_eq!(
            matchers,
            vec!["http.matchers.header", "http.matchers.host", "http.matchers.method", "http.matchers.path"]
        );
    }
}
