use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialField {
    Username,
    Password,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Login lookup keyed by domain. Unknown domains yield `None`.
pub trait CredentialStore: Send + Sync {
    fn lookup(&self, domain: &str) -> Option<Credentials>;
}

/// Credentials loaded from a JSON object of `{"domain": {"username", "password"}}`.
#[derive(Debug, Clone, Default)]
pub struct JsonCredentialStore {
    entries: HashMap<String, Credentials>,
}

impl JsonCredentialStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, AgentError> {
        let entries: HashMap<String, Credentials> = serde_json::from_str(json)
            .map_err(|e| AgentError::Config(format!("credentials file: {e}")))?;
        Ok(Self {
            entries: entries
                .into_iter()
                .map(|(domain, creds)| (domain.to_lowercase(), creds))
                .collect(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("reading {}: {e}", path.display())))?;
        let store = Self::from_json(&json)?;
        debug!(path = %path.display(), domains = store.entries.len(), "loaded credentials");
        Ok(store)
    }
}

impl CredentialStore for JsonCredentialStore {
    fn lookup(&self, domain: &str) -> Option<Credentials> {
        let domain = domain.to_lowercase();
        self.entries
            .get(&domain)
            .or_else(|| self.entries.get(domain.strip_prefix("www.")?))
            .cloned()
    }
}

/// Host part of a URL, or `None` if it does not parse.
pub fn domain_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .host_str()
        .map(str::to_string)
}
