//! Filesystem Storage Layer
//!
//! This module exposes a directory tree as an object store with soft deletes.
//! Deleting an object only drops a tombstone next to it; the reconciler later
//! decides whether the object really goes away or was written again since.

pub mod listing;
pub mod local_store;
pub mod reconciler;
pub mod tombstone;


use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::io;
use std::time::SystemTime;
use thiserror::Error;

pub use listing::DirectoryLister;
pub use local_store::LocalStore;
pub use reconciler::{PassSummary, Reconciler};
pub use tombstone::Tombstones;

/// Suffix appended to an object path to name its tombstone
pub const DEFAULT_TOMBSTONE_SUFFIX: &str = ".restfs-deleted";

/// Errors surfaced by storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not Found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Walk(#[from] walkdir::Error),
}

impl StoreError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        StoreError::BadRequest(msg.into())
    }
}

impl ResponseError for StoreError {
    fn status_code(&self) -> StatusCode {
        match self {
            StoreError::NotFound => StatusCode::NOT_FOUND,
            StoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
            StoreError::Io(_) | StoreError::Walk(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("text/plain; charset=utf-8")
            .body(format!("{}\n", self))
    }
}

/// Result of reading a path: either object content or a directory listing
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Object { content: Vec<u8>, modified: SystemTime },
    Listing(Vec<String>),
}

/// Trait defining the object storage interface used by the HTTP layer
pub trait Storage: Send + Sync {
    /// Read an object, or list it if the path names a directory
    fn read(&self, path: &str) -> Result<ReadOutcome, StoreError>;

    /// Create or replace an object, creating parent directories as needed
    fn write(&self, path: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Soft-delete an object, or every object below a directory when `recursive`
    fn delete(&self, path: &str, recursive: bool) -> Result<(), StoreError>;
}
