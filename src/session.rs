use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Persisted identity record. Presence of a verified record is what
/// unlocks the studio commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionIdentity {
    pub name: String,
    pub email: String,
    #[serde(rename = "isVerified")]
    pub verified: bool,
}

/// Storage seam for the session so the medium is swappable in tests.
/// The identity and the admin-routing id live under separate keys:
/// logout clears the former and deliberately leaves the latter behind.
pub trait SessionStore {
    fn load(&self) -> Option<SessionIdentity>;
    fn save(&self, identity: &SessionIdentity) -> Result<()>;
    fn clear(&self) -> Result<()>;
    fn load_routing_id(&self) -> Option<String>;
    fn save_routing_id(&self, chat_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RoutingRecord {
    chat_id: String,
}

/// JSON-file store, one file per key under the session directory.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn identity_path(&self) -> PathBuf {
        self.dir.join("identity.json")
    }

    fn routing_path(&self) -> PathBuf {
        self.dir.join("routing.json")
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Option<SessionIdentity> {
        let raw = fs::read_to_string(self.identity_path()).ok()?;
        match serde_json::from_str::<SessionIdentity>(&raw) {
            Ok(identity) => Some(identity),
            Err(err) => {
                // Corrupt records are dropped rather than carried along.
                warn!("Discarding unreadable session record: {err}");
                let _ = fs::remove_file(self.identity_path());
                None
            }
        }
    }

    fn save(&self, identity: &SessionIdentity) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let raw = serde_json::to_string_pretty(identity)?;
        fs::write(self.identity_path(), raw)
            .with_context(|| format!("Failed to write {}", self.identity_path().display()))
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(self.identity_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| {
                format!("Failed to remove {}", self.identity_path().display())
            }),
        }
    }

    fn load_routing_id(&self) -> Option<String> {
        let raw = fs::read_to_string(self.routing_path()).ok()?;
        serde_json::from_str::<RoutingRecord>(&raw)
            .ok()
            .map(|record| record.chat_id)
    }

    fn save_routing_id(&self, chat_id: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let raw = serde_json::to_string_pretty(&RoutingRecord {
            chat_id: chat_id.to_string(),
        })?;
        fs::write(self.routing_path(), raw)
            .with_context(|| format!("Failed to write {}", self.routing_path().display()))
    }
}

/// The login gate in front of the studio. A previously persisted
/// verified identity short-circuits straight to the verified state
/// without re-prompting.
pub struct SessionGate<S: SessionStore> {
    store: S,
    current: Option<SessionIdentity>,
}

impl<S: SessionStore> SessionGate<S> {
    pub fn open(store: S) -> Self {
        let current = store.load().filter(|identity| identity.verified);
        Self { store, current }
    }

    pub fn current(&self) -> Option<&SessionIdentity> {
        self.current.as_ref()
    }

    pub fn is_verified(&self) -> bool {
        self.current.is_some()
    }

    /// Validates and persists a new identity. Name and email are
    /// required; anything beyond non-emptiness is left to the backend.
    pub fn login(&mut self, name: &str, email: &str) -> Result<SessionIdentity> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() || email.is_empty() {
            return Err(anyhow!("Both a name and an email address are required"));
        }

        let identity = SessionIdentity {
            name: name.to_string(),
            email: email.to_string(),
            verified: true,
        };
        self.store.save(&identity)?;
        info!("Session verified for {}", identity.email);
        self.current = Some(identity.clone());
        Ok(identity)
    }

    /// Clears the persisted identity. The admin-routing id is kept so
    /// notification delivery survives a re-login.
    pub fn logout(&mut self) -> Result<()> {
        self.store.clear()?;
        self.current = None;
        info!("Session cleared");
        Ok(())
    }

    pub fn routing_id(&self) -> Option<String> {
        self.store.load_routing_id()
    }

    pub fn remember_routing_id(&self, chat_id: &str) -> Result<()> {
        self.store.save_routing_id(chat_id)
    }
}
