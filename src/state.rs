use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::db;
use crate::storage::{FileStore, LocalFileStore};
use crate::users::password::{Argon2Hasher, CredentialHasher};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn FileStore>,
    pub hasher: Arc<dyn CredentialHasher>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let db = db::connect(&config.database_url).await?;
        db::migrate(&db).await?;

        let storage = Arc::new(LocalFileStore::new(&config.app_root)) as Arc<dyn FileStore>;
        tracing::info!(
            app_root = %config.app_root.display(),
            upload_root = %config.upload_root().display(),
            "file store ready"
        );

        Ok(Self {
            db,
            config,
            storage,
            hasher: Arc::new(Argon2Hasher),
        })
    }

    pub fn from_parts(
        db: SqlitePool,
        config: Arc<AppConfig>,
        storage: Arc<dyn FileStore>,
        hasher: Arc<dyn CredentialHasher>,
    ) -> Self {
        Self {
            db,
            config,
            storage,
            hasher,
        }
    }

    /// State over an in-memory database and a local store rooted at `config.app_root`.
    pub async fn in_memory(config: AppConfig) -> anyhow::Result<Self> {
        let db = db::connect_in_memory().await?;
        db::migrate(&db).await?;
        let storage = Arc::new(LocalFileStore::new(&config.app_root)) as Arc<dyn FileStore>;
        Ok(Self::from_parts(
            db,
            Arc::new(config),
            storage,
            Arc::new(Argon2Hasher),
        ))
    }
}
