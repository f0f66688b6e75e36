use std::collections::HashMap;
use std::io::Read;
use std::sync::{PoisonError, RwLock};

use super::{MailStore, StorageError};

/// Keeps saved messages in memory, keyed by id
#[derive(Debug, Default)]
pub struct MemoryStore {
    emails: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Vec<u8>> {
        self.emails
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.emails
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of every saved message, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .emails
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

impl MailStore for MemoryStore {
    fn save_email(&self, id: &str, content: &mut dyn Read) -> Result<(), StorageError> {
        let mut data = Vec::new();
        content.read_to_end(&mut data)?;

        self.emails
            .write()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))?
            .insert(id.to_string(), data);
        Ok(())
    }
}
