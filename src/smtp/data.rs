//! DATA phase body collection

use std::mem;
use std::sync::Arc;

use log::debug;

use crate::smtp::email::PendingEmail;
use crate::smtp::error::SmtpError;
use crate::storage::{MailStore, StorageError};

/// What the session should do after a body line has been consumed
#[derive(Debug)]
pub enum DataAction {
    /// Keep reading body lines
    Continue,
    /// The terminator was seen and a save was attempted. Carries the id of
    /// the stored message or the reason it could not be stored.
    Complete(Result<String, StorageError>),
}

/// Rebuilds the message body from the lines received after DATA.
///
/// Lines are kept byte-for-byte, including their line endings, except that a
/// leading `..` loses its first dot. A line consisting of a single `.` ends
/// the body and is not part of it.
pub struct DataTranscoder {
    body: Vec<u8>,
    max_size: usize,
    store: Arc<dyn MailStore>,
}

impl DataTranscoder {
    pub fn new(store: Arc<dyn MailStore>, max_size: usize) -> Self {
        Self {
            body: Vec::new(),
            max_size,
            store,
        }
    }

    /// Bytes that may still be appended before the ceiling is crossed
    pub fn remaining(&self) -> usize {
        self.max_size.saturating_sub(self.body.len())
    }

    /// Drop any partially collected body
    pub fn reset(&mut self) {
        self.body = Vec::new();
    }

    pub fn consume(&mut self, line: &[u8]) -> Result<DataAction, SmtpError> {
        if is_terminator(line) {
            let email = PendingEmail::new(mem::take(&mut self.body));
            debug!(
                "Message {} complete: {} bytes, subject {:?}",
                email.id(),
                email.size(),
                email.subject().unwrap_or_default()
            );
            return Ok(DataAction::Complete(email.deliver(self.store.as_ref())));
        }

        let line = if line.starts_with(b"..") {
            &line[1..]
        } else {
            line
        };
        self.body.extend_from_slice(line);

        if self.body.len() > self.max_size {
            self.reset();
            return Err(SmtpError::MessageTooLarge { max: self.max_size });
        }

        Ok(DataAction::Continue)
    }
}

fn is_terminator(line: &[u8]) -> bool {
    strip_line_ending(line) == b"."
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r\n")
        .or_else(|| line.strip_suffix(b"\n"))
        .unwrap_or(line)
}
