//! Append-only, file-backed [`Store`] implementation (`persistence` feature).
//!
//! On-disk entry format (little-endian), a key-value *record* log:
//!
//! ```text
//! [1 byte: tag][32 bytes: key][4 bytes: payload_len][N bytes: payload][4 bytes: crc32]
//! ```
//!
//! `tag` is `0` for a `Put` (payload is the encoded record) or `1` for a
//! `Delete` (payload is empty). The CRC32 covers `tag ‖ key ‖ payload`.
//! `FileStore::open` replays the log from the start, verifying each entry's
//! CRC32 and rebuilding the in-memory index.

use super::Store;
use super::codec::{decode_bytes, encode_to_bytes};
use super::error::StoreError;
use crate::utils::Key;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const TAG_PUT: u8 = 0;
const TAG_DELETE: u8 = 1;

enum Pending {
    Put(Vec<u8>),
    Delete,
}

/// An append-only file-backed key-value store.
///
/// Writes are buffered in memory exactly like [`MemoryStore`]
/// (read-your-writes within a batch); [`Store::commit`] appends each
/// buffered mutation to the log file and fsyncs before clearing the
/// buffer, so a crash between appends leaves the log truncated but never
/// corrupts a prior entry.
///
/// [`MemoryStore`]: super::memory::MemoryStore
pub struct FileStore {
    path: PathBuf,
    file: File,
    /// key -> (offset, length) of the most recent surviving Put in the log.
    index: HashMap<Key, (u64, u32)>,
    pending: HashMap<Key, Pending>,
}

impl FileStore {
    /// Open (creating if absent) a file-backed store at `path`, replaying
    /// and verifying every entry already on disk.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be opened, or
    /// [`StoreError::Corrupt`] if an entry fails its CRC32 check.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut store = Self {
            path,
            file,
            index: HashMap::new(),
            pending: HashMap::new(),
        };
        store.replay()?;
        Ok(store)
    }

    fn replay(&mut self) -> Result<(), StoreError> {
        let mut reader = BufReader::new(self.file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;
        let mut offset: u64 = 0;

        loop {
            let mut tag_buf = [0u8; 1];
            match reader.read_exact(&mut tag_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let tag = tag_buf[0];

            let mut key = [0u8; 32];
            reader.read_exact(&mut key)?;

            let mut len_buf = [0u8; 4];
            reader.read_exact(&mut len_buf)?;
            let payload_len = u32::from_le_bytes(len_buf);

            let mut payload = vec![0u8; payload_len as usize];
            reader.read_exact(&mut payload)?;

            let mut crc_buf = [0u8; 4];
            reader.read_exact(&mut crc_buf)?;
            let stored_crc = u32::from_le_bytes(crc_buf);

            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&[tag]);
            hasher.update(&key);
            hasher.update(&payload);
            let actual_crc = hasher.finalize();

            if actual_crc != stored_crc {
                return Err(StoreError::Corrupt {
                    message: format!(
                        "entry at offset {offset} failed CRC32 check: expected {stored_crc:#010x}, got {actual_crc:#010x}"
                    ),
                });
            }

            let payload_offset = offset + 1 + 32 + 4;
            match tag {
                TAG_PUT => {
                    self.index.insert(key, (payload_offset, payload_len));
                }
                TAG_DELETE => {
                    self.index.remove(&key);
                }
                other => {
                    warn!(tag = other, "unknown journal entry tag, skipping");
                }
            }

            offset = payload_offset + u64::from(payload_len) + 4;
        }

        debug!(entries = self.index.len(), path = %self.path.display(), "replayed file store");
        Ok(())
    }

    fn read_payload(&self, offset: u64, len: u32) -> Result<Vec<u8>, StoreError> {
        let mut file = self.file.try_clone()?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn append_entry(&mut self, tag: u8, key: &Key, payload: &[u8]) -> Result<u64, StoreError> {
        self.file.seek(SeekFrom::End(0))?;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&[tag]);
        hasher.update(key);
        hasher.update(payload);
        let crc = hasher.finalize();

        self.file.write_all(&[tag])?;
        self.file.write_all(key)?;
        self.file.write_all(&(payload.len() as u32).to_le_bytes())?;
        let payload_offset = self.file.stream_position()?;
        self.file.write_all(payload)?;
        self.file.write_all(&crc.to_le_bytes())?;
        Ok(payload_offset)
    }

    fn raw_get(&self, key: &Key) -> Option<Vec<u8>> {
        match self.pending.get(key) {
            Some(Pending::Put(bytes)) => Some(bytes.clone()),
            Some(Pending::Delete) => None,
            None => {
                let (offset, len) = *self.index.get(key)?;
                self.read_payload(offset, len).ok()
            }
        }
    }
}

impl Store for FileStore {
    fn put<T: Serialize>(&mut self, key: Key, record: &T) -> Result<(), StoreError> {
        let bytes = encode_to_bytes(record)?;
        self.pending.insert(key, Pending::Put(bytes));
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, key: &Key) -> Result<Option<T>, StoreError> {
        match self.raw_get(key) {
            Some(bytes) => Ok(Some(decode_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn has(&self, key: &Key) -> bool {
        self.raw_get(key).is_some()
    }

    fn delete(&mut self, key: &Key, force: bool) {
        self.pending.insert(*key, Pending::Delete);
        if force {
            self.index.remove(key);
        }
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let pending = std::mem::take(&mut self.pending);
        for (key, pending) in pending {
            match pending {
                Pending::Put(bytes) => {
                    let offset = self.append_entry(TAG_PUT, &key, &bytes)?;
                    self.index.insert(key, (offset, bytes.len() as u32));
                }
                Pending::Delete => {
                    self.append_entry(TAG_DELETE, &key, &[])?;
                    self.index.remove(&key);
                }
            }
        }
        self.file.sync_data()?;
        Ok(())
    }

    fn discard(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(byte: u8) -> Key {
        let mut k = [0u8; 32];
        k[31] = byte;
        k
    }

    #[test]
    fn put_commit_reopen_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        {
            let mut store = FileStore::open(&path).unwrap();
            store.put(key(1), &"hello".to_string()).unwrap();
            store.commit().unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        let value: Option<String> = store.get(&key(1)).unwrap();
        assert_eq!(value, Some("hello".to_string()));
    }

    #[test]
    fn delete_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        {
            let mut store = FileStore::open(&path).unwrap();
            store.put(key(1), &1u64).unwrap();
            store.commit().unwrap();
            store.delete(&key(1), false);
            store.commit().unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert!(!store.has(&key(1)));
    }

    #[test]
    fn uncommitted_writes_do_not_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        {
            let mut store = FileStore::open(&path).unwrap();
            store.put(key(1), &1u64).unwrap();
            // no commit
        }

        let store = FileStore::open(&path).unwrap();
        assert!(!store.has(&key(1)));
    }

    #[test]
    fn corrupt_entry_is_detected_on_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        {
            let mut store = FileStore::open(&path).unwrap();
            store.put(key(1), &1u64).unwrap();
            store.commit().unwrap();
        }

        // flip a byte in the payload region to corrupt the CRC
        let mut bytes = std::fs::read(&path).unwrap();
        let payload_start = 1 + 32 + 4;
        bytes[payload_start] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        let result = FileStore::open(&path);
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }
}
