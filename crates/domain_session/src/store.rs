//! Session persistence port and its file adapter
//!
//! The file store keeps one JSON snapshot per directory. Saves go through a
//! temp file in the same directory followed by a rename, so readers see
//! either the previous snapshot or the new one, never a torn write.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use core_kernel::Clock;

use crate::error::SessionError;
use crate::recovery::RecoveryPolicy;
use crate::snapshot::{SessionSnapshot, SESSION_SCHEMA_VERSION};

const SNAPSHOT_FILE: &str = "bill_session.json";

/// Durable storage for the unfinished bill-creation session
pub trait SessionPort: Send + Sync {
    /// Atomically replaces the stored snapshot
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), SessionError>;

    /// The stored snapshot, if it is still eligible for recovery
    ///
    /// Ineligible or unreadable snapshots are cleared and reported as `None`.
    fn load(&self) -> Result<Option<SessionSnapshot>, SessionError>;

    /// Discards the stored snapshot; a missing one is not an error
    fn clear(&self) -> Result<(), SessionError>;

    fn has_active(&self) -> Result<bool, SessionError> {
        Ok(self.load()?.is_some())
    }
}

/// Stores the session as a JSON file
pub struct FileSessionStore {
    dir: PathBuf,
    policy: RecoveryPolicy,
    clock: Arc<dyn Clock>,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>, policy: RecoveryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            policy,
            clock,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    /// Best-effort removal of a snapshot that is being treated as absent
    fn discard(&self) {
        if let Err(e) = self.clear() {
            warn!(error = %e, "Could not remove discarded session snapshot");
        }
    }

    /// Reads and decodes the file; any failure other than absence is
    /// reported as a corrupt snapshot
    fn read(&self, path: &Path) -> Result<Option<SessionSnapshot>, String> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("unreadable: {e}")),
        };
        let snapshot: SessionSnapshot =
            serde_json::from_slice(&bytes).map_err(|e| format!("undecodable: {e}"))?;
        if snapshot.schema_version != SESSION_SCHEMA_VERSION {
            return Err(format!("unknown schema version {}", snapshot.schema_version));
        }
        Ok(Some(snapshot))
    }
}

impl SessionPort for FileSessionStore {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), SessionError> {
        fs::create_dir_all(&self.dir).map_err(|e| SessionError::io(&self.dir, e))?;

        let mut stamped = snapshot.clone();
        stamped.schema_version = SESSION_SCHEMA_VERSION;
        stamped.last_saved_at = self.clock.now();
        let data = serde_json::to_vec_pretty(&stamped)?;

        let path = self.path();
        let mut temp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| SessionError::io(&self.dir, e))?;
        temp.write_all(&data)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| SessionError::io(temp.path(), e))?;
        temp.persist(&path).map_err(|e| SessionError::Persist {
            path: path.clone(),
            message: e.to_string(),
        })?;

        debug!(session_id = %stamped.session_id, step = ?stamped.step, "Session saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<SessionSnapshot>, SessionError> {
        let path = self.path();
        let snapshot = match self.read(&path) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(None),
            Err(reason) => {
                warn!(path = %path.display(), %reason, "Discarding corrupt session snapshot");
                self.discard();
                return Ok(None);
            }
        };

        let assessment = self.policy.assess(&snapshot, self.clock.now());
        if !assessment.is_recoverable() {
            info!(session_id = %snapshot.session_id, ?assessment, "Clearing unrecoverable session");
            self.discard();
            return Ok(None);
        }

        Ok(Some(snapshot))
    }

    fn clear(&self) -> Result<(), SessionError> {
        let path = self.path();
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Session cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::io(path, e)),
        }
    }
}
