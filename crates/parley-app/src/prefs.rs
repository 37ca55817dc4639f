//! Persisted local preferences.
//!
//! Key/value storage for the remembered identity, last-known role, and room
//! persistence flags. Values are CBOR-encoded. The trait is synchronous; both
//! implementations share state internally so clones see the same data.

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};

use parley_core::{Identity, RoomCode};
use parley_proto::Role;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Table: prefs
/// Key: preference name
/// Value: CBOR-encoded value
const PREFS: TableDefinition<&str, &[u8]> = TableDefinition::new("prefs");

/// Preference errors.
#[derive(Debug, Error)]
pub enum PrefsError {
    /// Backing store failed.
    #[error("storage error: {0}")]
    Io(String),

    /// Value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Known preference keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefKey {
    /// Display name
    Identity,
    /// Last room code
    RoomCode,
    /// Last-known role in that room
    Role,
    /// Whether that room is persistent
    RoomPersistent,
    /// Retention of that room
    PersistenceDays,
}

impl PrefKey {
    /// Every key, for clearing.
    pub const ALL: [Self; 5] =
        [Self::Identity, Self::RoomCode, Self::Role, Self::RoomPersistent, Self::PersistenceDays];

    /// Storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::RoomCode => "room_code",
            Self::Role => "role",
            Self::RoomPersistent => "room_persistent",
            Self::PersistenceDays => "persistence_days",
        }
    }
}

/// A change to persisted preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefUpdate {
    /// A session started.
    Session {
        /// Display name
        identity: Identity,
        /// Room code
        room_code: RoomCode,
    },
    /// The local role changed.
    Role(Role),
    /// Room metadata arrived.
    Room {
        /// History outlives the last participant
        is_persistent: bool,
        /// Retention for persistent rooms
        persistence_days: Option<u32>,
    },
    /// The session ended; forget everything.
    Clear,
}

/// What was remembered from a previous run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedSession {
    /// Display name
    pub identity: Option<String>,
    /// Room code
    pub room_code: Option<String>,
    /// Last-known role
    pub role: Option<Role>,
    /// Whether the room is persistent
    pub is_persistent: Option<bool>,
    /// Room retention
    pub persistence_days: Option<u32>,
}

/// Key/value preference store.
///
/// Must be Clone + Send + Sync; implementations share state so clones see
/// the same values.
pub trait Prefs: Clone + Send + Sync + 'static {
    /// Raw bytes stored under `key`.
    fn get_raw(&self, key: PrefKey) -> Result<Option<Vec<u8>>, PrefsError>;

    /// Store raw bytes under `key`, overwriting.
    fn set_raw(&self, key: PrefKey, value: &[u8]) -> Result<(), PrefsError>;

    /// Remove `key`. Removing an absent key is a no-op.
    fn remove(&self, key: PrefKey) -> Result<(), PrefsError>;

    /// Typed read.
    fn get<T: DeserializeOwned>(&self, key: PrefKey) -> Result<Option<T>, PrefsError> {
        self.get_raw(key)?
            .map(|bytes| {
                ciborium::from_reader(bytes.as_slice())
                    .map_err(|e| PrefsError::Serialization(e.to_string()))
            })
            .transpose()
    }

    /// Typed write.
    fn set<T: Serialize>(&self, key: PrefKey, value: &T) -> Result<(), PrefsError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(value, &mut bytes)
            .map_err(|e| PrefsError::Serialization(e.to_string()))?;
        self.set_raw(key, &bytes)
    }

    /// Load everything remembered.
    fn load(&self) -> Result<SavedSession, PrefsError> {
        Ok(SavedSession {
            identity: self.get(PrefKey::Identity)?,
            room_code: self.get(PrefKey::RoomCode)?,
            role: self.get(PrefKey::Role)?,
            is_persistent: self.get(PrefKey::RoomPersistent)?,
            persistence_days: self.get(PrefKey::PersistenceDays)?,
        })
    }

    /// Apply one update.
    fn apply(&self, update: &PrefUpdate) -> Result<(), PrefsError> {
        match update {
            PrefUpdate::Session { identity, room_code } => {
                self.set(PrefKey::Identity, &identity.as_str())?;
                self.set(PrefKey::RoomCode, &room_code.as_str())
            },
            PrefUpdate::Role(role) => self.set(PrefKey::Role, role),
            PrefUpdate::Room { is_persistent, persistence_days } => {
                self.set(PrefKey::RoomPersistent, is_persistent)?;
                match persistence_days {
                    Some(days) => self.set(PrefKey::PersistenceDays, days),
                    None => self.remove(PrefKey::PersistenceDays),
                }
            },
            PrefUpdate::Clear => {
                for key in PrefKey::ALL {
                    self.remove(key)?;
                }
                Ok(())
            },
        }
    }
}

/// In-memory preferences for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct MemoryPrefs {
    inner: Arc<Mutex<HashMap<PrefKey, Vec<u8>>>>,
}

impl MemoryPrefs {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<PrefKey, Vec<u8>>>, PrefsError> {
        self.inner.lock().map_err(|_| PrefsError::Io("prefs lock poisoned".to_string()))
    }
}

impl Prefs for MemoryPrefs {
    fn get_raw(&self, key: PrefKey) -> Result<Option<Vec<u8>>, PrefsError> {
        Ok(self.lock()?.get(&key).cloned())
    }

    fn set_raw(&self, key: PrefKey, value: &[u8]) -> Result<(), PrefsError> {
        self.lock()?.insert(key, value.to_vec());
        Ok(())
    }

    fn remove(&self, key: PrefKey) -> Result<(), PrefsError> {
        self.lock()?.remove(&key);
        Ok(())
    }
}

/// Durable preferences backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbPrefs {
    db: Arc<Database>,
}

impl RedbPrefs {
    /// Open or create a database at `path`.
    ///
    /// # Errors
    ///
    /// Returns `PrefsError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PrefsError> {
        let db = Database::create(path.as_ref()).map_err(|e| PrefsError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| PrefsError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(PREFS).map_err(|e| PrefsError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| PrefsError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl Prefs for RedbPrefs {
    fn get_raw(&self, key: PrefKey) -> Result<Option<Vec<u8>>, PrefsError> {
        let txn = self.db.begin_read().map_err(|e| PrefsError::Io(e.to_string()))?;
        let table = txn.open_table(PREFS).map_err(|e| PrefsError::Io(e.to_string()))?;

        let value = table.get(key.as_str()).map_err(|e| PrefsError::Io(e.to_string()))?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn set_raw(&self, key: PrefKey, value: &[u8]) -> Result<(), PrefsError> {
        let txn = self.db.begin_write().map_err(|e| PrefsError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(PREFS).map_err(|e| PrefsError::Io(e.to_string()))?;
            table.insert(key.as_str(), value).map_err(|e| PrefsError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| PrefsError::Io(e.to_string()))
    }

    fn remove(&self, key: PrefKey) -> Result<(), PrefsError> {
        let txn = self.db.begin_write().map_err(|e| PrefsError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(PREFS).map_err(|e| PrefsError::Io(e.to_string()))?;
            table.remove(key.as_str()).map_err(|e| PrefsError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| PrefsError::Io(e.to_string()))
    }
}
