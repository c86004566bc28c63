use crate::error::AuthError;
use crate::record::{CredentialRecord, Secret};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Storage for registry passwords
///
/// Implementations are read concurrently by independent resolver calls.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the secret for a registry record
    ///
    /// Fails with [`AuthError::SecretNotFound`] if nothing is stored for the record.
    async fn get_secret(&self, record: &CredentialRecord) -> Result<Secret, AuthError>;
}

/// In-process secret store, mostly useful for embedding and tests
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, Secret>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: &CredentialRecord, secret: Secret) {
        self.write().insert(record.secret_key(), secret);
    }

    pub fn remove(&self, record: &CredentialRecord) -> bool {
        self.write().remove(&record.secret_key()).is_some()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Secret>> {
        self.secrets.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, record: &CredentialRecord) -> Result<Secret, AuthError> {
        let key = record.secret_key();
        let secrets = self.secrets.read().unwrap_or_else(|e| e.into_inner());
        secrets
            .get(&key)
            .cloned()
            .ok_or(AuthError::SecretNotFound { key })
    }
}

/// Secret store backed by a JSON file mapping secret keys to passwords
///
/// The file is re-read on every lookup so external edits are picked up.
/// On unix it is written with mode 0600.
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store (or replace) the secret for a record
    pub async fn set_secret(&self, record: &CredentialRecord, secret: &Secret) -> Result<(), AuthError> {
        let mut secrets = self.read_all().await?;
        secrets.insert(record.secret_key(), secret.expose().to_string());
        self.write_all(&secrets).await
    }

    /// Remove the secret for a record, returning whether one existed
    pub async fn delete_secret(&self, record: &CredentialRecord) -> Result<bool, AuthError> {
        let mut secrets = self.read_all().await?;
        let existed = secrets.remove(&record.secret_key()).is_some();
        if existed {
            self.write_all(&secrets).await?;
        }
        Ok(existed)
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, AuthError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(AuthError::SecretStore(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        serde_json::from_str(&contents).map_err(|e| {
            AuthError::SecretStore(format!("Failed to parse {}: {}", self.path.display(), e))
        })
    }

    async fn write_all(&self, secrets: &BTreeMap<String, String>) -> Result<(), AuthError> {
        let io_err =
            |e: std::io::Error| AuthError::SecretStore(format!("Failed to write {}: {}", self.path.display(), e));

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(secrets)
            .map_err(|e| AuthError::SecretStore(format!("Failed to serialize secrets: {}", e)))?;
        // Written to an owner-only sibling first, then renamed over the target
        let staging = self.staging_path();
        let mut file = create_private(&staging).await.map_err(io_err)?;
        file.write_all(json.as_bytes()).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);
        tokio::fs::rename(&staging, &self.path).await.map_err(io_err)?;

        debug!("Wrote {} registry secret(s) to {}", secrets.len(), self.path.display());
        Ok(())
    }
}

/// Create a fresh file readable only by its owner (mode 0600 on unix)
///
/// A leftover file at `path` is removed first so its permissions are never reused.
async fn create_private(path: &Path) -> std::io::Result<tokio::fs::File> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    options.open(path).await
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get_secret(&self, record: &CredentialRecord) -> Result<Secret, AuthError> {
        let key = record.secret_key();
        let mut secrets = self.read_all().await?;
        secrets
            .remove(&key)
            .map(Secret::new)
            .ok_or(AuthError::SecretNotFound { key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CredentialRecord {
        CredentialRecord::new("https://reg.example.com", Some("u".to_string()))
    }

    #[tokio::test]
    async fn test_memory_store_missing_secret() {
        let store = MemorySecretStore::new();
        let err = store.get_secret(&record()).await.unwrap_err();
        assert!(matches!(err, AuthError::SecretNotFound { ref key } if key == "https://reg.example.com#u"));
    }

    #[tokio::test]
    async fn test_memory_store_insert_and_remove() {
        let store = MemorySecretStore::new();
        store.insert(&record(), Secret::new("p"));
        assert_eq!(store.get_secret(&record()).await.unwrap().expose(), "p");

        assert!(store.remove(&record()));
        assert!(store.get_secret(&record()).await.is_err());
    }

    #[tokio::test]
    async fn test_file_store_set_get_delete() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(temp_dir.path().join("nested").join("secrets.json"));

        assert!(matches!(
            store.get_secret(&record()).await,
            Err(AuthError::SecretNotFound { .. })
        ));

        store.set_secret(&record(), &Secret::new("p")).await.unwrap();
        assert_eq!(store.get_secret(&record()).await.unwrap().expose(), "p");

        // A second handle on the same file sees the stored value
        let other = FileSecretStore::new(store.path().to_path_buf());
        assert_eq!(other.get_secret(&record()).await.unwrap().expose(), "p");

        assert!(store.delete_secret(&record()).await.unwrap());
        assert!(!store.delete_secret(&record()).await.unwrap());
        assert!(store.get_secret(&record()).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(temp_dir.path().join("secrets.json"));
        store.set_secret(&record(), &Secret::new("p")).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_private_file_is_owner_only_before_any_write() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("secrets.json.tmp");
        std::fs::write(&path, "stale").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let _file = create_private(&path).await.unwrap();

        let metadata = std::fs::metadata(&path).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
        assert_eq!(metadata.len(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_replaces_world_readable_file() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("secrets.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileSecretStore::new(path.clone());
        store.set_secret(&record(), &Secret::new("p")).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!temp_dir.path().join("secrets.json.tmp").exists());
        assert_eq!(store.get_secret(&record()).await.unwrap().expose(), "p");
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("secrets.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileSecretStore::new(path);
        assert!(matches!(
            store.get_secret(&record()).await,
            Err(AuthError::SecretStore(_))
        ));
    }
}
