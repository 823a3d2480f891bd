//! Firmware Blob Store
//!
//! Firmware images live as plain files under one directory, addressed by
//! their file name. Writes land in a private temp file and are renamed into
//! place once the declared length has been received, so readers only ever
//! see complete images.

use futures_util::Stream;
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use super::upload::{read_bounded, UploadError};

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Invalid firmware reference: {0:?}")]
    InvalidReference(String),

    #[error("Firmware file not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, BlobError>;

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn path_for(&self, reference: &str) -> Result<PathBuf> {
        validate_reference(reference)?;
        Ok(self.root.join(reference))
    }

    pub async fn exists(&self, reference: &str) -> Result<bool> {
        let path = self.path_for(reference)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read(&self, reference: &str) -> Result<Vec<u8>> {
        let path = self.path_for(reference)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(reference.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Store `expected` bytes from `stream` under `reference`.
    ///
    /// On any failure the previous image (if one exists) is left untouched.
    pub async fn write<S, B, E>(
        &self,
        reference: &str,
        stream: S,
        expected: u64,
        deadline: Duration,
    ) -> Result<u64>
    where
        S: Stream<Item = std::result::Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        let target = self.path_for(reference)?;
        let staging = self.root.join(format!(".{}.part", Uuid::new_v4()));

        let outcome = Self::stage(&staging, &target, stream, expected, deadline).await;
        if outcome.is_err() {
            fs::remove_file(&staging).await.ok();
        }
        let written = outcome?;

        info!(reference, bytes = written, "stored firmware image");
        Ok(written)
    }

    async fn stage<S, B, E>(
        staging: &Path,
        target: &Path,
        stream: S,
        expected: u64,
        deadline: Duration,
    ) -> Result<u64>
    where
        S: Stream<Item = std::result::Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        let mut file = fs::File::create(staging).await?;
        let written = read_bounded(stream, expected, &mut file, deadline).await?;
        file.sync_all().await?;
        drop(file);

        debug!(?staging, ?target, "renaming staged firmware image");
        fs::rename(staging, target).await?;
        Ok(written)
    }
}

/// A reference is a single plain file name inside the blob directory.
pub fn validate_reference(reference: &str) -> Result<()> {
    let valid = !reference.is_empty()
        && !reference.starts_with('.')
        && !reference.contains(['/', '\\'])
        && !reference.chars().any(char::is_control)
        && reference.len() <= 255;

    if valid {
        Ok(())
    } else {
        Err(BlobError::InvalidReference(reference.to_string()))
    }
}
