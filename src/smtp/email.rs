//! Email data structures and functionality

use std::borrow::Cow;

use uuid::Uuid;

use crate::storage::{MailStore, StorageError};

/// A fully received message body waiting to be handed to storage
///
/// The content has dot-stuffing undone and excludes the terminator line.
#[derive(Debug, Clone)]
pub struct PendingEmail {
    id: String,
    content: Vec<u8>,
}

impl PendingEmail {
    /// Wrap a completed body under a freshly generated identifier
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the size of the email data in bytes
    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// Get the subject line from the email headers (if present)
    pub fn subject(&self) -> Option<Cow<'_, str>> {
        for line in self.content.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                // End of headers
                break;
            }
            if line.len() > 8 && line[..8].eq_ignore_ascii_case(b"subject:") {
                return Some(String::from_utf8_lossy(line[8..].trim_ascii()));
            }
        }
        None
    }

    /// Save the message and return its identifier. The message is consumed
    /// whether or not the save succeeds.
    pub fn deliver(self, store: &dyn MailStore) -> Result<String, StorageError> {
        store.save_email(&self.id, &mut self.content.as_slice())?;
        Ok(self.id)
    }
}
