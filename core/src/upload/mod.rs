//! Asset upload pipeline for images and videos.
//!
//! # Overview
//! An upload is register -> upload -> finalize, optionally followed by
//! polling until the asset has been processed:
//!
//! - `source` resolves a file reference into a length-known `ByteSource`.
//! - `session` turns the register response into upload instructions and
//!   checks that the byte ranges tile the file.
//! - `state` is the explicit state machine every step goes through.
//! - `pool` uploads chunks on scoped worker threads behind a join barrier.
//! - `poll` watches the asset status after finalize.
//! - `orchestrator` drives the steps and tags failures with their phase.
//!
//! Nothing is persisted. An interrupted upload starts over.

mod orchestrator;
mod pool;
mod poll;
pub mod session;
pub mod source;
pub mod state;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};

pub use orchestrator::{UploadRequest, Uploader};
pub use poll::{classify_status, AssetStatus};
pub use session::{plan_chunks, ByteRange, UploadChunk, UploadSession};
pub use source::{resolve, ByteSource, FileRef, FileSource, MemorySource};
pub use state::{transition, UploadEvent, UploadState};

const MIB: u64 = 1024 * 1024;

/// Videos of at least this many bytes are uploaded in chunks.
pub const DEFAULT_CHUNK_THRESHOLD: u64 = 4 * MIB;
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * MIB;
pub const DEFAULT_PARALLELISM: usize = 4;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_POLLS: u32 = 100;
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Collection path segment, e.g. `/videos`.
    pub fn collection(&self) -> &'static str {
        match self {
            MediaKind::Image => "images",
            MediaKind::Video => "videos",
        }
    }

    /// Field naming the asset in request and response records.
    pub fn field(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

impl FromStr for MediaKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            other => Err(Error::Catalog(format!("{other} does not support uploads"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub chunk_threshold: u64,
    pub chunk_size: u64,
    /// Concurrent chunk uploads.
    pub parallelism: usize,
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub poll_timeout: Duration,
}

impl UploadOptions {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Configuration("chunk size must be positive".to_string()));
        }
        if self.parallelism == 0 {
            return Err(Error::Configuration("parallelism must be at least 1".to_string()));
        }
        if self.max_polls == 0 {
            return Err(Error::Configuration("max polls must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallelism: DEFAULT_PARALLELISM,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// What the CLI reports after an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub asset: String,
    pub kind: MediaKind,
    pub size: u64,
    pub chunks: usize,
    /// Processing was observed to complete. Always false without `--wait`.
    pub confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub polls: u32,
}
