//! Attachment byte fetching.
//!
//! Archive assembly never talks to a mail provider directly; it goes through
//! the [`AttachmentFetcher`] capability. Authorization is the fetcher's
//! concern — an implementation backed by a real provider is expected to
//! enforce the caller's access to the referenced account.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from fetching one attachment's bytes.
///
/// A fetch failure skips that attachment's unit; it never aborts the build.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("attachment not found: {0}")]
    NotFound(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Capability interface for retrieving raw attachment bytes.
#[async_trait]
pub trait AttachmentFetcher: Send + Sync {
    /// Fetch the raw bytes of one attachment by its provider ids.
    async fn fetch(
        &self,
        account_ref: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, FetchError>;
}

/// Filesystem-backed fetcher reading `<root>/<message_id>/<attachment_id>`.
///
/// Used by the CLI for exports from a local attachment cache.
pub struct DirFetcher {
    root: PathBuf,
}

impl DirFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// Provider ids are opaque but must stay within the cache directory.
fn safe_component(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\'])
        && !id.contains('\0')
}

#[async_trait]
impl AttachmentFetcher for DirFetcher {
    async fn fetch(
        &self,
        _account_ref: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, FetchError> {
        if !safe_component(message_id) || !safe_component(attachment_id) {
            return Err(FetchError::Other(format!(
                "invalid id path components: {message_id:?}/{attachment_id:?}"
            )));
        }
        let path: &Path = &self.root.join(message_id).join(attachment_id);
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(FetchError::NotFound(path.display().to_string()))
            }
            Err(err) => Err(FetchError::Transport(err)),
        }
    }
}
