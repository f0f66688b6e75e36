use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use log::debug;
use tempfile::NamedTempFile;

use super::{MailStore, StorageError, day_prefix, email_key, is_valid_id};

/// Stores each message as a file under a date-partitioned tree:
/// `<root>/emails/<yyyy>/<mm>/<dd>/<id>.eml`.
///
/// The date is the UTC day on which the message was saved. Files are written
/// to a temporary name in the target directory and renamed into place, so a
/// listed message is always complete.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, date: NaiveDate, id: &str) -> PathBuf {
        self.root.join(email_key(date, id))
    }

    /// Ids of the messages saved on `date`, sorted
    pub fn list_day(&self, date: NaiveDate) -> Result<Vec<String>, StorageError> {
        let dir = self.root.join(day_prefix(date));
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(id) = name.strip_suffix(".eml") {
                if is_valid_id(id) {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Read back a message saved on `date`
    pub fn get(&self, date: NaiveDate, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        if !is_valid_id(id) {
            return Err(StorageError::InvalidId(id.to_string()));
        }

        match fs::read(self.path_for(date, id)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_on(
        &self,
        date: NaiveDate,
        id: &str,
        content: &mut dyn Read,
    ) -> Result<PathBuf, StorageError> {
        if !is_valid_id(id) {
            return Err(StorageError::InvalidId(id.to_string()));
        }

        let path = self.path_for(date, id);
        let dir = path
            .parent()
            .ok_or_else(|| StorageError::InvalidId(id.to_string()))?;
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        io::copy(content, &mut tmp)?;
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(&path).map_err(|e| e.error)?;
        Ok(path)
    }
}

impl MailStore for DirStore {
    fn save_email(&self, id: &str, content: &mut dyn Read) -> Result<(), StorageError> {
        let path = self.save_on(Utc::now().date_naive(), id, content)?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
    }

    #[test]
    fn test_open_creates_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("nested").join("bucket");
        let store = DirStore::open(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(store.root(), root);
    }

    #[test]
    fn test_save_uses_date_partitioned_key() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::open(tmp.path()).unwrap();

        let path = store
            .save_on(date(), "abc-123", &mut &b"A\r\nB\r\n"[..])
            .unwrap();
        assert_eq!(path, tmp.path().join("emails/2024/02/29/abc-123.eml"));
        assert_eq!(fs::read(&path).unwrap(), b"A\r\nB\r\n");
        assert_eq!(
            store.get(date(), "abc-123").unwrap().as_deref(),
            Some(&b"A\r\nB\r\n"[..])
        );
    }

    #[test]
    fn test_list_day() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::open(tmp.path()).unwrap();
        assert!(store.list_day(date()).unwrap().is_empty());

        store.save_on(date(), "bbb", &mut &b"2"[..]).unwrap();
        store.save_on(date(), "aaa", &mut &b"1"[..]).unwrap();
        let other_day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        store.save_on(other_day, "ccc", &mut &b"3"[..]).unwrap();

        assert_eq!(store.list_day(date()).unwrap(), vec!["aaa", "bbb"]);
        assert_eq!(store.list_day(other_day).unwrap(), vec!["ccc"]);
    }

    #[test]
    fn test_duplicate_id_is_not_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::open(tmp.path()).unwrap();

        store.save_on(date(), "same", &mut &b"first"[..]).unwrap();
        assert!(store.save_on(date(), "same", &mut &b"second"[..]).is_err());
        assert_eq!(store.get(date(), "same").unwrap().unwrap(), b"first");
    }

    #[test]
    fn test_rejects_unsafe_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::open(tmp.path()).unwrap();

        assert!(matches!(
            store.save_email("../escape", &mut &b"x"[..]),
            Err(StorageError::InvalidId(_))
        ));
        assert!(matches!(
            store.get(date(), "a/b"),
            Err(StorageError::InvalidId(_))
        ));
    }

    #[test]
    fn test_save_email_uses_today() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::open(tmp.path()).unwrap();

        store.save_email("today", &mut &b"body"[..]).unwrap();
        let today = Utc::now().date_naive();
        // A save right at midnight may land on the next day
        let found = store.list_day(today).unwrap().contains(&"today".to_string())
            || store
                .list_day(today.succ_opt().unwrap())
                .unwrap()
                .contains(&"today".to_string());
        assert!(found);
    }
}
