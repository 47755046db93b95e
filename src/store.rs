//! Remote secret store abstraction.
//!
//! [`SecretStore`] is the async trait the sync engine drives; the in-cluster
//! Kubernetes implementation lives in the binary's `infra` module. The trait
//! keeps not-found distinct from every other failure because it is the one
//! error the engine acts on (it switches a pass from update to create).

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::snapshot::SecretData;

/// Label key identifying which system manages a secret.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Label value stamped on every secret this process creates.
pub const MANAGED_BY_VALUE: &str = "file-secret-sync";

/// A secret object as seen by this system: its data mapping plus the
/// store-managed metadata we carry through on updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteSecret {
    pub name: String,
    pub data: SecretData,
    pub labels: BTreeMap<String, String>,
    /// Store-assigned version, sent back on update so the server can reject
    /// a write that races another client.
    pub resource_version: Option<String>,
}

impl RemoteSecret {
    /// Builds a fresh secret with the given data, tagged as managed by this
    /// system. Used on the create path.
    pub fn managed(name: impl Into<String>, data: SecretData) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
        Self {
            name: name.into(),
            data,
            labels,
            resource_version: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("secret not found")]
    NotFound,
    #[error("store returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("http request failed")]
    Http(#[from] reqwest::Error),
    #[error("malformed secret payload: {0}")]
    Encoding(String),
}

/// Remote key-value secret store with get/create/update semantics.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches the secret `name` in `namespace`. Absence is reported as
    /// [`StoreError::NotFound`].
    async fn get(&self, namespace: &str, name: &str) -> Result<RemoteSecret, StoreError>;

    /// Creates `secret` in `namespace`.
    async fn create(&self, namespace: &str, secret: &RemoteSecret) -> Result<(), StoreError>;

    /// Replaces the existing secret in `namespace` with `secret`.
    async fn update(&self, namespace: &str, secret: &RemoteSecret) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_secret_carries_ownership_label() {
        let secret = RemoteSecret::managed("creds", SecretData::new());
        assert_eq!(
            secret.labels.get(MANAGED_BY_LABEL).map(String::as_str),
            Some(MANAGED_BY_VALUE)
        );
        assert_eq!(secret.name, "creds");
        assert!(secret.resource_version.is_none());
    }
}
