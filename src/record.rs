use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A registry the user has registered credentials for
///
/// The record never holds the password. It is fetched from a
/// [`SecretStore`](crate::secrets::SecretStore) under [`CredentialRecord::secret_key`]
/// every time it is needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Registry URL as entered by the user (e.g. "https://registry.example.com")
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl CredentialRecord {
    pub fn new(url: impl Into<String>, username: Option<String>) -> Self {
        Self {
            url: url.into(),
            username: username.filter(|u| !u.is_empty()),
        }
    }

    /// Username for basic auth, empty when none is set
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or_default()
    }

    pub fn has_username(&self) -> bool {
        !self.username().is_empty()
    }

    /// URL without surrounding whitespace or trailing slashes
    pub fn normalized_url(&self) -> &str {
        normalize_url(&self.url)
    }

    /// Registry hostname without protocol or path (e.g. "registry.example.com:5000")
    pub fn registry_host(&self) -> &str {
        registry_host_of(&self.url)
    }

    /// Key under which the secret for this record is stored
    pub fn secret_key(&self) -> String {
        format!("{}#{}", self.normalized_url(), self.username())
    }

    /// Whether `url` names the same registry as this record
    pub fn matches_url(&self, url: &str) -> bool {
        self.normalized_url() == normalize_url(url)
    }
}

pub(crate) fn normalize_url(url: &str) -> &str {
    url.trim().trim_end_matches('/')
}

/// Hostname part of a registry URL
pub fn registry_host_of(url: &str) -> &str {
    let url = url.trim();
    let without_scheme = url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    without_scheme.split('/').next().unwrap_or(without_scheme)
}

/// A registry password or access key
///
/// `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Credentials for a container CLI `login` invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CliCredentials {
    pub registry_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<CliAuth>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CliAuth {
    pub username: String,
    pub password: Secret,
}
