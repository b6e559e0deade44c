//! The serve registry: a hot-reloadable database of serve records.
//!
//! The registry is a directory manipulated cooperatively with an external
//! operator:
//!
//! ```text
//!     servedb
//!     ├── last_error      cause of the most recent rejection
//!     ├── serves.loaded   last accepted document (authoritative on cold start)
//!     ├── serves.new      candidate renamed in by the operator
//!     └── serves.rej      most recent rejected candidate, verbatim
//! ```
//!
//! The operator rename()s a candidate into `serves.new`. On some later
//! [`ServeDb::poll`] the candidate is parsed and either committed (written
//! durably to `serves.loaded` before the in-memory map is swapped, so a crash
//! lands on the newer state) or rejected, in which case it is renamed to
//! `serves.rej` with the cause in `last_error` and the previous state stays in
//! force. Acceptance is a copy and rejection is a rename so that an external
//! program can tell the two apart from stat() information alone, and so a
//! dangling handle to `serves.new` cannot corrupt `serves.loaded`.

mod record;

pub use record::{ParseError, ProtocolKind, ServeKey, ServeRecord};

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::RwLock;

use thiserror::Error;
use tracing::warn;

/// Errors from [`ServeDb::poll`]. A rejected candidate is *not* an error:
/// these represent real database manipulation failures (out of disk,
/// permissions), which callers treat as unrecoverable.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("serve database I/O failure: {0}")]
    Io(#[from] io::Error),
    /// `serves.loaded` was accepted in a previous run and must stay readable.
    #[error("serves.loaded no longer parses: {0}")]
    CorruptLoaded(#[source] ParseError),
    /// Recording a rejection itself failed; both causes are reported since
    /// this is a sign things have gone seriously wrong.
    #[error("could not record rejection ({source}) of invalid serve document: {cause}")]
    RejectFailed {
        cause: ParseError,
        #[source]
        source: io::Error,
    },
}

/// The serve database. One instance is owned by the supervisor; snapshot
/// readers only ever see fully installed maps.
pub struct ServeDb {
    dir: PathBuf,
    records: RwLock<HashMap<ServeKey, ServeRecord>>,
    // Controls the semantics of the first poll(), which may load
    // serves.loaded from a cold start.
    beyond_first_poll: bool,
}

impl ServeDb {
    pub fn new(dir: impl Into<PathBuf>) -> ServeDb {
        ServeDb {
            dir: dir.into(),
            records: RwLock::new(HashMap::new()),
            beyond_first_poll: false,
        }
    }

    fn loaded_path(&self) -> PathBuf {
        self.dir.join("serves.loaded")
    }

    fn new_path(&self) -> PathBuf {
        self.dir.join("serves.new")
    }

    fn rej_path(&self) -> PathBuf {
        self.dir.join("serves.rej")
    }

    fn err_path(&self) -> PathBuf {
        self.dir.join("last_error")
    }

    /// Detached copy of the current records. Elements are owned by the caller
    /// and never alias the registry's internal map.
    pub fn snapshot(&self) -> Vec<ServeRecord> {
        let records = match self.records.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.values().cloned().collect()
    }

    fn install(&self, mapping: HashMap<ServeKey, ServeRecord>) {
        let mut records = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *records = mapping;
    }

    /// Poll for new serve records to load. Returns whether the current
    /// snapshot changed.
    ///
    /// The first poll reads `serves.loaded` if present; an absent file is just
    /// a fresh database. Every poll then considers `serves.new`: a valid
    /// candidate is committed durably and installed, an invalid one is
    /// rejected in place with the previous snapshot retained.
    pub fn poll(&mut self) -> Result<bool, RegistryError> {
        let mut new_info = false;

        if !self.beyond_first_poll {
            new_info = self.poll_first_time()?;
            self.beyond_first_poll = true;
        }

        let candidate = match fs::read(self.new_path()) {
            Ok(contents) => contents,
            // The common branch: no candidate has been provided for loading.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(new_info),
            Err(e) => return Err(e.into()),
        };

        match record::parse_document(&candidate) {
            Err(cause) => {
                warn!("rejecting serve document: {cause}");
                match self.reject(&cause) {
                    Ok(()) => Ok(new_info),
                    Err(source) => Err(RegistryError::RejectFailed { cause, source }),
                }
            }
            Ok(mapping) => {
                // Reflect the accepted state in the database before
                // installing it, so a crash yields the new state rather than
                // the old one.
                self.persist_loaded(&candidate)?;

                // These are advisory; failing to remove them is not failure.
                let _ = fs::remove_file(self.err_path());
                let _ = fs::remove_file(self.rej_path());

                self.install(mapping);
                Ok(true)
            }
        }
    }

    fn poll_first_time(&mut self) -> Result<bool, RegistryError> {
        let contents = match fs::read(self.loaded_path()) {
            Ok(contents) => contents,
            // No previously loaded state: a fresh database, and that counts
            // as new information for the caller.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };

        let mapping =
            record::parse_document(&contents).map_err(RegistryError::CorruptLoaded)?;
        self.install(mapping);
        Ok(true)
    }

    /// Durably copy accepted contents over `serves.loaded` and retire
    /// `serves.new`: temp file, fsync, rename, directory fsync, unlink,
    /// directory fsync. A crash between the rename and the unlink leaves an
    /// already-accepted `serves.new` behind, which the next poll re-accepts
    /// idempotently.
    fn persist_loaded(&self, contents: &[u8]) -> Result<(), io::Error> {
        let dir = File::open(&self.dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.loaded_path()).map_err(|e| e.error)?;

        // The rename is visible but not yet durable.
        dir.sync_all()?;

        fs::remove_file(self.new_path())?;
        dir.sync_all()?;

        Ok(())
    }

    /// Rename the refused candidate to `serves.rej` and record the cause.
    /// `last_error` is written without fsync: an empty file after a crash is
    /// acceptable for an advisory.
    fn reject(&self, cause: &ParseError) -> Result<(), io::Error> {
        fs::rename(self.new_path(), self.rej_path())?;
        fs::write(self.err_path(), format!("{cause}\n"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_paths() {
        let db = ServeDb::new("/srv/servedb");
        assert_eq!(db.loaded_path(), PathBuf::from("/srv/servedb/serves.loaded"));
        assert_eq!(db.new_path(), PathBuf::from("/srv/servedb/serves.new"));
        assert_eq!(db.rej_path(), PathBuf::from("/srv/servedb/serves.rej"));
        assert_eq!(db.err_path(), PathBuf::from("/srv/servedb/last_error"));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let db = ServeDb::new("/nonexistent");
        let doc = br#"{"serves": [{"i": "a", "url": "https://t:s@h", "p": "/a.sock"}]}"#;
        db.install(record::parse_document(doc).unwrap());

        let mut snap = db.snapshot();
        snap[0].identity = "mutated".to_string();

        // The registry's own map must be unaffected by edits to the snapshot.
        assert_eq!(db.snapshot()[0].identity, "a");
    }
}
