//! Credential lookup for adapters.

use std::collections::HashMap;
use std::sync::Arc;

/// Resolves named secrets. Absence is a normal answer, never an error.
pub trait CredentialProvider: Send + Sync + Clone {
    fn credential(&self, key: &str) -> Option<String>;
}

/// Reads credentials from process environment variables. Empty values count
/// as absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn credential(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Fixed credential map, for tests and for wiring secrets from another source.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    values: Arc<HashMap<String, String>>,
}

impl StaticCredentials {
    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: Arc::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn credential(&self, key: &str) -> Option<String> {
        self.values.get(key).filter(|v| !v.is_empty()).cloned()
    }
}
