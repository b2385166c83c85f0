use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{
    fs,
    io::{AsyncRead, AsyncWriteExt},
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Location and size of a file after it has been fully written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub path: PathBuf,
    pub size: u64,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Directory holding the user's files. Created on first use, reused afterwards.
    async fn ensure_namespace(&self, user_id: i64) -> io::Result<PathBuf>;

    /// Directory for unnamespaced writes.
    async fn flat_dir(&self) -> io::Result<PathBuf>;

    /// Streams `body` into `dir/file_name`. The target only appears once every byte is on disk.
    async fn write(
        &self,
        dir: &Path,
        file_name: &str,
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> io::Result<StoredObject>;

    async fn open(&self, path: &Path) -> io::Result<Box<dyn AsyncRead + Send + Unpin>>;

    async fn remove(&self, path: &Path) -> io::Result<()>;
}

/// File store backed by the local filesystem.
///
/// Layout: `<app_root>/users/images/<user_id>/<file_name>`; flat writes go to
/// `<app_root>/uploads`, away from the database file and dotenv config that share the root.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    upload_root: PathBuf,
    flat_root: PathBuf,
}

impl LocalFileStore {
    pub fn new(app_root: impl Into<PathBuf>) -> Self {
        let app_root = app_root.into();
        Self {
            upload_root: app_root.join("users").join("images"),
            flat_root: app_root.join("uploads"),
        }
    }

    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn ensure_namespace(&self, user_id: i64) -> io::Result<PathBuf> {
        let dir = self.upload_root.join(user_id.to_string());
        // create_dir_all succeeds when the directory already exists
        fs::create_dir_all(&dir).await?;
        debug!(user_id, dir = %dir.display(), "user namespace ready");
        Ok(dir)
    }

    async fn flat_dir(&self) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.flat_root).await?;
        Ok(self.flat_root.clone())
    }

    async fn write(
        &self,
        dir: &Path,
        file_name: &str,
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> io::Result<StoredObject> {
        let path = dir.join(file_name);
        // fixed length so any name the filesystem accepts also fits its temp file
        let tmp = dir.join(format!(".{}.part", Uuid::new_v4().simple()));

        let written = async {
            let mut file = fs::File::create(&tmp).await?;
            let size = tokio::io::copy(body, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, &path).await?;
            Ok::<_, io::Error>(size)
        }
        .await;

        match written {
            Ok(size) => {
                debug!(path = %path.display(), size, "file stored");
                Ok(StoredObject { path, size })
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&tmp).await {
                    if cleanup.kind() != io::ErrorKind::NotFound {
                        warn!(error = %cleanup, tmp = %tmp.display(), "failed to remove partial upload");
                    }
                }
                Err(e)
            }
        }
    }

    async fn open(&self, path: &Path) -> io::Result<Box<dyn AsyncRead + Send + Unpin>> {
        let file = fs::File::open(path).await?;
        Ok(Box::new(file))
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }
}
