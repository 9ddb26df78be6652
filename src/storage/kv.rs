use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::storage::Storage;
use crate::ticket::MemoryTicketStore;
use std::fs;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;

/// File-backed storage for the CLI harness: an append-only event log and store snapshots.
///
/// Files:
/// - `events.log`: Append-only event log (u64 LE length prefix + bincode Event)
/// - `tickets.bin`: Ticket store snapshot (bincode MemoryTicketStore)
/// - `tickets.bin.tmp`: Temporary file for atomic snapshot writes
pub struct FileStorage {
    event_log_path: PathBuf,
    store_path: PathBuf,
    store_tmp_path: PathBuf,
}

impl FileStorage {
    /// Create a new FileStorage with paths from config
    pub fn new(config: &Config) -> Self {
        FileStorage::with_paths(config.get_event_log_path(), config.get_store_path())
    }

    /// Create FileStorage with custom paths (for testing)
    pub fn with_paths(event_log_path: PathBuf, store_path: PathBuf) -> Self {
        let store_tmp_path = store_path.with_extension("bin.tmp");
        FileStorage {
            event_log_path,
            store_path,
            store_tmp_path,
        }
    }

    fn ensure_dir(&self) -> Result<()> {
        for path in [&self.event_log_path, &self.store_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::StateError(format!("Failed to create data directory: {}", e))
                })?;
            }
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn append_event(&mut self, event: &Event) -> Result<()> {
        self.ensure_dir()?;

        let bytes = bincode::serialize(event)
            .map_err(|e| Error::StateError(format!("Failed to serialize event: {}", e)))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.event_log_path)
            .map_err(|e| Error::StateError(format!("Failed to open event log for append: {}", e)))?;

        let len = bytes.len() as u64;
        file.write_all(&len.to_le_bytes())
            .map_err(|e| Error::StateError(format!("Failed to write event length: {}", e)))?;
        file.write_all(&bytes)
            .map_err(|e| Error::StateError(format!("Failed to write event data: {}", e)))?;

        file.sync_all()
            .map_err(|e| Error::StateError(format!("Failed to fsync event log: {}", e)))?;

        Ok(())
    }

    fn load_events(&self) -> Result<Vec<Event>> {
        if !self.event_log_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.event_log_path)
            .map_err(|e| Error::StateError(format!("Failed to open event log: {}", e)))?;
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();

        loop {
            let mut len_buf = [0u8; 8];
            match reader.read_exact(&mut len_buf) {
                Ok(_) => {}
                Err(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    return Err(Error::StateError(format!("Failed to read event log: {}", e)));
                }
            }
            let mut buf = vec![0u8; u64::from_le_bytes(len_buf) as usize];
            reader
                .read_exact(&mut buf)
                .map_err(|e| Error::StateError(format!("Failed to read event data: {}", e)))?;
            events.push(bincode::deserialize(&buf).map_err(|e| {
                Error::StateError(format!("Failed to deserialize event: {}", e))
            })?);
        }

        Ok(events)
    }

    fn load_store(&self) -> Result<Option<MemoryTicketStore>> {
        if !self.store_path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&self.store_path)
            .map_err(|e| Error::StateError(format!("Failed to open store file: {}", e)))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| Error::StateError(format!("Failed to read store file: {}", e)))?;

        let store: MemoryTicketStore = bincode::deserialize(&data)
            .map_err(|e| Error::StateError(format!("Failed to deserialize store: {}", e)))?;
        Ok(Some(store))
    }

    fn persist_store(&mut self, store: &MemoryTicketStore) -> Result<()> {
        self.ensure_dir()?;

        let bytes = bincode::serialize(store)
            .map_err(|e| Error::StateError(format!("Failed to serialize store: {}", e)))?;

        let mut file = File::create(&self.store_tmp_path)
            .map_err(|e| Error::StateError(format!("Failed to create temp store file: {}", e)))?;
        file.write_all(&bytes)
            .map_err(|e| Error::StateError(format!("Failed to write store: {}", e)))?;

        // Fsync before rename (crash safety)
        file.sync_all()
            .map_err(|e| Error::StateError(format!("Failed to fsync temp store file: {}", e)))?;
        drop(file);

        fs::rename(&self.store_tmp_path, &self.store_path)
            .map_err(|e| Error::StateError(format!("Failed to rename temp store file: {}", e)))?;

        // Fsync parent directory (ensure rename is persisted)
        if let Some(parent) = self.store_path.parent() {
            let parent_file = File::open(parent)
                .map_err(|e| Error::StateError(format!("Failed to open parent directory: {}", e)))?;
            parent_file
                .sync_all()
                .map_err(|e| Error::StateError(format!("Failed to fsync parent directory: {}", e)))?;
        }

        Ok(())
    }
}
