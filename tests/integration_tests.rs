use async_trait::async_trait;
use file_secret_sync::store::{
    MANAGED_BY_LABEL, MANAGED_BY_VALUE, RemoteSecret, SecretStore, StoreError,
};
use file_secret_sync::sync::SyncEngine;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct StoreState {
    secret: Option<RemoteSecret>,
    creates: usize,
    updates: usize,
}

#[derive(Clone, Default)]
struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get(&self, _namespace: &str, name: &str) -> Result<RemoteSecret, StoreError> {
        match &self.state().secret {
            Some(s) if s.name == name => Ok(s.clone()),
            _ => Err(StoreError::NotFound),
        }
    }

    async fn create(&self, _namespace: &str, secret: &RemoteSecret) -> Result<(), StoreError> {
        let mut st = self.state();
        st.creates += 1;
        let mut stored = secret.clone();
        stored.resource_version = Some("1".to_string());
        st.secret = Some(stored);
        Ok(())
    }

    async fn update(&self, _namespace: &str, secret: &RemoteSecret) -> Result<(), StoreError> {
        let mut st = self.state();
        st.updates += 1;
        st.secret = Some(secret.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_full_sync_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("username"), "admin").unwrap();
    std::fs::create_dir(dir.path().join("tls")).unwrap();
    std::fs::write(dir.path().join("tls").join("cert.pem"), "certdata").unwrap();

    let store = MemoryStore::default();
    let engine = SyncEngine::new(store.clone(), "prod", "db-creds", dir.path());

    // First pass creates the secret from the folder contents.
    engine.reconcile_once().await.unwrap();
    {
        let st = store.state();
        assert_eq!(st.creates, 1);
        let secret = st.secret.as_ref().unwrap();
        assert_eq!(secret.data.get("username").unwrap(), b"admin");
        assert_eq!(secret.data.get("tls.cert.pem").unwrap(), b"certdata");
        assert_eq!(
            secret.labels.get(MANAGED_BY_LABEL).map(String::as_str),
            Some(MANAGED_BY_VALUE)
        );
    }

    // A pass with no folder change writes nothing.
    engine.reconcile_once().await.unwrap();
    {
        let st = store.state();
        assert_eq!(st.creates, 1);
        assert_eq!(st.updates, 0);
    }

    // A content change forces exactly one wholesale update.
    std::fs::write(dir.path().join("username"), "root").unwrap();
    engine.reconcile_once().await.unwrap();
    {
        let st = store.state();
        assert_eq!(st.updates, 1);
        let secret = st.secret.as_ref().unwrap();
        assert_eq!(secret.data.get("username").unwrap(), b"root");
        assert_eq!(secret.data.len(), 2);
    }
}

#[tokio::test]
async fn test_empty_folder_never_creates_a_secret() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::default();
    let engine = SyncEngine::new(store.clone(), "prod", "db-creds", dir.path());

    engine.reconcile_once().await.unwrap();

    let st = store.state();
    assert_eq!(st.creates, 0);
    assert!(st.secret.is_none());
}
