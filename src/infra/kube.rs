//! In-cluster Kubernetes secret store.
//!
//! [`KubeSecretStore`] implements [`SecretStore`] against the API server's
//! REST interface using the pod's service-account credentials: bearer token
//! and CA bundle from the serviceaccount mount, server address from the
//! standard in-cluster environment variables. Secret `data` values travel
//! base64-encoded on the wire.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use file_secret_sync::snapshot::SecretData;
use file_secret_sync::store::{RemoteSecret, SecretStore, StoreError};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Reads the namespace this pod runs in from the service-account mount.
pub fn current_namespace() -> Result<String> {
    let path = format!("{SERVICE_ACCOUNT_DIR}/namespace");
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read namespace from {path}"))?;
    Ok(raw.trim().to_string())
}

pub struct KubeSecretStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl KubeSecretStore {
    /// Builds a store from the in-cluster environment.
    ///
    /// Requires `KUBERNETES_SERVICE_HOST` (port falls back to 443 when
    /// `KUBERNETES_SERVICE_PORT_HTTPS` is unset) and the mounted token and
    /// CA bundle. Any missing piece is a startup failure.
    pub fn from_cluster_env() -> Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .context("KUBERNETES_SERVICE_HOST is not set; not running in a cluster?")?;
        let port =
            std::env::var("KUBERNETES_SERVICE_PORT_HTTPS").unwrap_or_else(|_| "443".to_string());

        let token_path = format!("{SERVICE_ACCOUNT_DIR}/token");
        let token = std::fs::read_to_string(&token_path)
            .with_context(|| format!("failed to read service account token from {token_path}"))?
            .trim()
            .to_string();

        let ca_path = format!("{SERVICE_ACCOUNT_DIR}/ca.crt");
        let ca = std::fs::read(&ca_path)
            .with_context(|| format!("failed to read cluster CA from {ca_path}"))?;
        let cert =
            reqwest::Certificate::from_pem(&ca).context("cluster CA bundle is not valid PEM")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .add_root_certificate(cert)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: format!("https://{host}:{port}"),
            token,
        })
    }

    fn secrets_url(&self, namespace: &str) -> String {
        format!("{}/api/v1/namespaces/{namespace}/secrets", self.base_url)
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<RemoteSecret, StoreError> {
        let url = format!("{}/{name}", self.secrets_url(namespace));
        let response = self.client.get(&url).bearer_auth(&self.token).send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let manifest: SecretManifest = response.json().await?;
        from_manifest(manifest)
    }

    async fn create(&self, namespace: &str, secret: &RemoteSecret) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.secrets_url(namespace))
            .bearer_auth(&self.token)
            .json(&to_manifest(namespace, secret))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    async fn update(&self, namespace: &str, secret: &RemoteSecret) -> Result<(), StoreError> {
        let url = format!("{}/{}", self.secrets_url(namespace), secret.name);
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .json(&to_manifest(namespace, secret))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }
}

async fn error_from_response(response: reqwest::Response) -> StoreError {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return StoreError::NotFound;
    }
    let body = response.text().await.unwrap_or_default();
    StoreError::Api {
        status: status.as_u16(),
        body,
    }
}

/// Wire shape of a `v1/Secret`, reduced to the fields this system touches.
/// Unknown fields in API responses are ignored on deserialization.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretManifest {
    api_version: String,
    kind: String,
    metadata: Metadata,
    #[serde(rename = "type")]
    secret_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    data: BTreeMap<String, String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource_version: Option<String>,
}

fn to_manifest(namespace: &str, secret: &RemoteSecret) -> SecretManifest {
    SecretManifest {
        api_version: "v1".to_string(),
        kind: "Secret".to_string(),
        metadata: Metadata {
            name: secret.name.clone(),
            namespace: Some(namespace.to_string()),
            labels: secret.labels.clone(),
            resource_version: secret.resource_version.clone(),
        },
        secret_type: "Opaque".to_string(),
        data: secret
            .data
            .iter()
            .map(|(k, v)| (k.clone(), BASE64.encode(v)))
            .collect(),
    }
}

fn from_manifest(manifest: SecretManifest) -> Result<RemoteSecret, StoreError> {
    let mut data = SecretData::new();
    for (key, encoded) in manifest.data {
        let bytes = BASE64.decode(encoded.as_bytes()).map_err(|e| {
            StoreError::Encoding(format!("secret key {key} is not valid base64: {e}"))
        })?;
        data.insert(key, bytes);
    }

    Ok(RemoteSecret {
        name: manifest.metadata.name,
        data,
        labels: manifest.metadata.labels,
        resource_version: manifest.metadata.resource_version,
    })
}
