//! Uploaded media files, stored flat as `<post_id><ext>`.

use crate::error::{StoreError, StoreResult};
use crate::models::MediaUpload;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "webm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Classifies a stored or uploaded file name by its extension.
pub fn media_kind(name: &str) -> Option<MediaKind> {
    let ext = extension_of(name)?;
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
    max_bytes: u64,
}

impl MediaStore {
    pub fn open(dir: impl Into<PathBuf>, max_bytes: u64) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, max_bytes })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Checks size and type, returning the lowercased extension.
    pub fn validate(&self, upload: &MediaUpload) -> StoreResult<String> {
        if upload.bytes.is_empty() {
            return Err(StoreError::validation("Media file is empty"));
        }
        if upload.bytes.len() as u64 > self.max_bytes {
            return Err(StoreError::Validation(format!(
                "Media file is too large ({} bytes, limit {})",
                upload.bytes.len(),
                self.max_bytes
            )));
        }
        if media_kind(&upload.filename).is_none() {
            return Err(StoreError::Validation(format!(
                "Unsupported media type: {}",
                upload.filename
            )));
        }
        extension_of(&upload.filename)
            .ok_or_else(|| StoreError::validation("Media file has no extension"))
    }

    /// Writes the upload as `<id>.<ext>` and returns the stored file name.
    pub fn save(&self, id: &str, upload: &MediaUpload) -> StoreResult<String> {
        let ext = self.validate(upload)?;
        let name = format!("{}.{}", id, ext);
        fs::write(self.dir.join(&name), &upload.bytes)?;
        tracing::debug!("Stored media {} ({} bytes)", name, upload.bytes.len());
        Ok(name)
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Removes a stored file. A file that is already gone is not an error.
    pub fn remove(&self, name: &str) -> StoreResult<bool> {
        match fs::remove_file(self.path_of(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
