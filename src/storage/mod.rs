//! Message storage backends
//!
//! The session only ever needs one capability from storage: save a byte
//! stream under an identifier it generated. Anything implementing
//! [`MailStore`] can be plugged into the server.

use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;

mod dir;
mod memory;
mod s3;

pub use dir::DirStore;
pub use memory::MemoryStore;
pub use s3::{DEFAULT_ENDPOINT, DEFAULT_REGION, S3Settings, S3Store};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid message id: {0:?}")]
    InvalidId(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Persists received messages.
///
/// Implementations are shared by every session and must tolerate concurrent
/// saves with distinct ids. No ordering between concurrent saves is implied.
pub trait MailStore: Send + Sync {
    fn save_email(&self, id: &str, content: &mut dyn Read) -> Result<(), StorageError>;
}

/// Which backend messages go to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageTarget {
    /// A local directory tree
    Directory(PathBuf),
    /// An S3-compatible bucket
    Bucket(S3Settings),
}

impl fmt::Display for StorageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(root) => write!(f, "{}", root.display()),
            Self::Bucket(s3) => write!(f, "s3://{} at {}", s3.bucket, s3.endpoint),
        }
    }
}

/// An opened store, with the read-back operations used by the CLI
pub enum Backend {
    Dir(DirStore),
    S3(S3Store),
}

impl Backend {
    pub fn open(target: &StorageTarget) -> Result<Self, StorageError> {
        Ok(match target {
            StorageTarget::Directory(root) => Self::Dir(DirStore::open(root)?),
            StorageTarget::Bucket(settings) => Self::S3(S3Store::connect(settings)?),
        })
    }

    /// Ids of the messages saved on `date`, sorted
    pub fn list_day(&self, date: NaiveDate) -> Result<Vec<String>, StorageError> {
        match self {
            Self::Dir(store) => store.list_day(date),
            Self::S3(store) => store.list_day(date),
        }
    }

    pub fn get(&self, date: NaiveDate, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match self {
            Self::Dir(store) => store.get(date, id),
            Self::S3(store) => store.get(date, id),
        }
    }

    pub fn into_store(self) -> Arc<dyn MailStore> {
        match self {
            Self::Dir(store) => Arc::new(store),
            Self::S3(store) => Arc::new(store),
        }
    }
}

/// Key under which a message saved on `date` is stored,
/// e.g. `emails/2024/05/17/<id>.eml`
pub fn email_key(date: NaiveDate, id: &str) -> String {
    format!("{}/{id}.eml", day_prefix(date))
}

/// Common prefix of every message saved on `date`
pub fn day_prefix(date: NaiveDate) -> String {
    format!("emails/{}", date.format("%Y/%m/%d"))
}

/// Ids end up in object keys and file names, so only a conservative alphabet
/// is allowed.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

#[cfg(test)]
pub(crate) struct FailingStore;

#[cfg(test)]
impl MailStore for FailingStore {
    fn save_email(&self, _id: &str, _content: &mut dyn Read) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("bucket offline".to_string()))
    }
}
