use std::{io, path::PathBuf};

use tokio::io::AsyncRead;
use tracing::{error, info, instrument, warn};

use super::repo::{self, Image};
use crate::{
    config::{BulkUploadMode, DeletePolicy},
    error::{AppError, Result},
    state::AppState,
    storage::StoredObject,
    users::repo::User,
};

/// Physical file written by an upload, with its record when one was registered.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub file_name: String,
    pub path: PathBuf,
    pub image: Option<Image>,
}

/// Validates a client-supplied file name for use as a single path component.
pub fn sanitize_file_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    let unsafe_name = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(&['/', '\\', '\0'][..]);
    if unsafe_name {
        warn!(file_name = %raw, "rejected file name");
        return Err(AppError::BadRequest(format!("Invalid file name: {raw:?}")));
    }
    Ok(name.to_string())
}

/// Stores one file for `user_id` and registers it as an image named `logical_name`.
///
/// The file is complete on disk before the record exists. A failed insert after a
/// successful write is reported as `PartialFailure` carrying the orphaned path.
/// The returned `file_name` is the sanitized name the file was stored under.
#[instrument(skip(state, body))]
pub async fn upload(
    state: &AppState,
    user_id: i64,
    logical_name: &str,
    file_name: &str,
    body: &mut (dyn AsyncRead + Send + Unpin),
) -> Result<StoredFile> {
    let file_name = sanitize_file_name(file_name)?;
    User::get(&state.db, user_id).await?;

    let dir = state.storage.ensure_namespace(user_id).await?;
    let stored = state.storage.write(&dir, &file_name, body).await?;
    info!(user_id, path = %stored.path.display(), size = stored.size, "upload stored");

    let path = stored.path.clone();
    let image = register(state, user_id, logical_name, stored).await?;
    Ok(StoredFile {
        file_name,
        path,
        image: Some(image),
    })
}

async fn register(
    state: &AppState,
    user_id: i64,
    logical_name: &str,
    stored: StoredObject,
) -> Result<Image> {
    let path = stored.path.to_string_lossy().into_owned();
    match repo::insert_image(&state.db, logical_name, &path, user_id).await {
        Ok(image) => {
            info!(user_id, image_id = image.id, %path, "image registered");
            Ok(image)
        }
        Err(e) => {
            error!(error = %e, user_id, %path, "image record insert failed after file write");
            Err(AppError::PartialFailure {
                path: stored.path,
                source: Box::new(e),
            })
        }
    }
}

/// Multi-file upload fed one stream at a time, as multipart fields arrive.
pub struct BulkUpload<'s> {
    state: &'s AppState,
    user_id: i64,
    mode: BulkUploadMode,
    dir: PathBuf,
    stored: Vec<StoredFile>,
}

impl<'s> BulkUpload<'s> {
    pub async fn begin(state: &'s AppState, user_id: i64) -> Result<Self> {
        let mode = state.config.bulk_upload;
        let dir = match mode {
            BulkUploadMode::Registered => {
                User::get(&state.db, user_id).await?;
                state.storage.ensure_namespace(user_id).await?
            }
            BulkUploadMode::Legacy => state.storage.flat_dir().await?,
        };
        Ok(Self {
            state,
            user_id,
            mode,
            dir,
            stored: Vec::new(),
        })
    }

    #[instrument(skip(self, body), fields(user_id = self.user_id, mode = ?self.mode))]
    pub async fn add(
        &mut self,
        file_name: &str,
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<&StoredFile> {
        let file_name = sanitize_file_name(file_name)?;
        let stored = self.state.storage.write(&self.dir, &file_name, body).await?;
        let path = stored.path.clone();

        let image = match self.mode {
            BulkUploadMode::Registered => {
                Some(register(self.state, self.user_id, &file_name, stored).await?)
            }
            BulkUploadMode::Legacy => {
                info!(path = %path.display(), "file stored without image record");
                None
            }
        };

        self.stored.push(StoredFile {
            file_name,
            path,
            image,
        });
        Ok(&self.stored[self.stored.len() - 1])
    }

    pub fn finish(self) -> Result<Vec<StoredFile>> {
        if self.stored.is_empty() {
            return Err(AppError::BadRequest("At least one file is required".into()));
        }
        Ok(self.stored)
    }
}

/// Stores every `(file_name, stream)` pair in order.
pub async fn upload_many<R>(
    state: &AppState,
    user_id: i64,
    files: Vec<(String, R)>,
) -> Result<Vec<StoredFile>>
where
    R: AsyncRead + Send + Unpin,
{
    let mut bulk = BulkUpload::begin(state, user_id).await?;
    for (file_name, mut body) in files {
        bulk.add(&file_name, &mut body).await?;
    }
    bulk.finish()
}

/// Resolves an image for `user_id` under the configured ownership mode.
pub async fn get_image(state: &AppState, user_id: i64, image_id: i64) -> Result<Image> {
    repo::get_image_for_user(&state.db, state.config.ownership, user_id, image_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Image not found".into()))
}

/// Opens the stored bytes of an image.
#[instrument(skip(state))]
pub async fn open_image_file(
    state: &AppState,
    user_id: i64,
    image_id: i64,
) -> Result<(Image, Box<dyn AsyncRead + Send + Unpin>)> {
    let image = get_image(state, user_id, image_id).await?;
    let file = state
        .storage
        .open(std::path::Path::new(&image.path))
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                warn!(image_id, path = %image.path, "image file missing on disk");
                AppError::NotFound("Image file not found".into())
            }
            _ => AppError::Io(e),
        })?;
    Ok((image, file))
}

/// Deletes the image record; the file goes too only under `DeletePolicy::Purge`.
#[instrument(skip(state))]
pub async fn delete_image(state: &AppState, user_id: i64, image_id: i64) -> Result<Option<Image>> {
    let removed =
        repo::delete_image(&state.db, state.config.ownership, user_id, image_id).await?;

    match (&removed, state.config.delete_policy) {
        (Some(image), DeletePolicy::Purge) => {
            if let Err(e) = state.storage.remove(std::path::Path::new(&image.path)).await {
                warn!(error = %e, image_id, path = %image.path, "failed to remove image file");
            } else {
                info!(image_id, path = %image.path, "image file removed");
            }
        }
        (Some(image), DeletePolicy::KeepFile) => {
            info!(image_id, path = %image.path, "image record deleted, file kept");
        }
        (None, _) => {
            info!(image_id, "no image record to delete");
        }
    }
    Ok(removed)
}
