use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// How image lookups and deletes treat the `user_id` path segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnershipMode {
    /// Only images owned by the user in the path are visible.
    #[default]
    Strict,
    /// Images are resolved by id alone; the user segment is ignored.
    Loose,
}

/// What happens to the stored file when an image record is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletePolicy {
    /// Remove the metadata only, the file stays on disk.
    #[default]
    KeepFile,
    /// Remove the record and the file.
    Purge,
}

/// Behaviour of the multi-file upload endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkUploadMode {
    /// Every file lands in the user's directory and gets an image record.
    #[default]
    Registered,
    /// Files are written flat under `<app_root>/uploads` with no records.
    /// A second file with the same name replaces the first.
    Legacy,
}

impl OwnershipMode {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "loose" => Ok(Self::Loose),
            other => anyhow::bail!("unknown IMAGE_OWNERSHIP value: {other}"),
        }
    }
}

impl DeletePolicy {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "keep-file" | "keep_file" | "keep" => Ok(Self::KeepFile),
            "purge" => Ok(Self::Purge),
            other => anyhow::bail!("unknown DELETE_POLICY value: {other}"),
        }
    }
}

impl BulkUploadMode {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "registered" => Ok(Self::Registered),
            "legacy" => Ok(Self::Legacy),
            other => anyhow::bail!("unknown BULK_UPLOAD value: {other}"),
        }
    }
}

fn parse_byte_limit(raw: &str) -> anyhow::Result<usize> {
    raw.trim()
        .parse::<usize>()
        .with_context(|| format!("invalid MAX_UPLOAD_BYTES value: {raw:?}"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    /// Root of the file store; uploads live under `<app_root>/users/images`.
    pub app_root: PathBuf,
    pub ownership: OwnershipMode,
    pub delete_policy: DeletePolicy,
    pub bulk_upload: BulkUploadMode,
    pub max_upload_bytes: Option<usize>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://myimages.db?mode=rwc".into());

        let listen_addr: SocketAddr = format!(
            "{}:{}",
            std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
        )
        .parse()
        .context("parse APP_HOST/APP_PORT")?;

        let app_root = match std::env::var("APP_ROOT") {
            Ok(root) => PathBuf::from(root),
            Err(_) => std::env::current_dir().context("resolve current directory")?,
        };
        let app_root = std::path::absolute(&app_root)
            .with_context(|| format!("resolve APP_ROOT {}", app_root.display()))?;

        let ownership = match std::env::var("IMAGE_OWNERSHIP") {
            Ok(v) => OwnershipMode::parse(&v)?,
            Err(_) => OwnershipMode::default(),
        };
        let delete_policy = match std::env::var("DELETE_POLICY") {
            Ok(v) => DeletePolicy::parse(&v)?,
            Err(_) => DeletePolicy::default(),
        };
        let bulk_upload = match std::env::var("BULK_UPLOAD") {
            Ok(v) => BulkUploadMode::parse(&v)?,
            Err(_) => BulkUploadMode::default(),
        };
        let max_upload_bytes = match std::env::var("MAX_UPLOAD_BYTES") {
            Ok(v) => Some(parse_byte_limit(&v)?),
            Err(_) => None,
        };

        Ok(Self {
            database_url,
            listen_addr,
            app_root,
            ownership,
            delete_policy,
            bulk_upload,
            max_upload_bytes,
        })
    }

    /// Config rooted at `app_root` with every policy at its default.
    pub fn with_root(database_url: impl Into<String>, app_root: impl Into<PathBuf>) -> Self {
        Self {
            database_url: database_url.into(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            app_root: app_root.into(),
            ownership: OwnershipMode::default(),
            delete_policy: DeletePolicy::default(),
            bulk_upload: BulkUploadMode::default(),
            max_upload_bytes: None,
        }
    }

    pub fn upload_root(&self) -> PathBuf {
        self.app_root.join("users").join("images")
    }
}
