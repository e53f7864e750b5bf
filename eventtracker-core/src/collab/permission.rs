//! Runtime permission contract and persisted grants.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TrackerError, TrackerResult};

/// Something the user has to allow before the app may do it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    SendSms,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::SendSms => "send_sms",
        }
    }

    /// Prompt shown when asking for it.
    pub fn description(&self) -> &'static str {
        match self {
            Capability::SendSms => "send text messages with your upcoming events",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    Granted,
    Denied,
}

pub trait PermissionGate: Send + Sync {
    fn has_permission(&self, capability: Capability) -> bool;

    /// Ask for `capability`. Already granted capabilities return `Granted`
    /// without asking again.
    fn request_permission(&self, capability: Capability) -> PermissionDecision;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Grants {
    #[serde(default)]
    granted: BTreeSet<Capability>,
}

/// Grants stored in `permissions.toml`. Requests for anything not already
/// granted are denied; interactive front ends grant first, then record it here.
#[derive(Debug, Clone)]
pub struct GrantStore {
    path: PathBuf,
}

impl GrantStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        GrantStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> TrackerResult<Grants> {
        if !self.path.exists() {
            return Ok(Grants::default());
        }
        let content = fs::read_to_string(&self.path)?;
        toml::from_str(&content).map_err(|e| TrackerError::Serialization(e.to_string()))
    }

    fn save(&self, grants: &Grants) -> TrackerResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(grants).map_err(|e| TrackerError::Serialization(e.to_string()))?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn is_granted(&self, capability: Capability) -> bool {
        self.load()
            .map(|grants| grants.granted.contains(&capability))
            .unwrap_or(false)
    }

    pub fn grant(&self, capability: Capability) -> TrackerResult<()> {
        let mut grants = self.load()?;
        if grants.granted.insert(capability) {
            self.save(&grants)?;
            debug!(capability = %capability, "permission granted");
        }
        Ok(())
    }
}

impl PermissionGate for GrantStore {
    fn has_permission(&self, capability: Capability) -> bool {
        self.is_granted(capability)
    }

    fn request_permission(&self, capability: Capability) -> PermissionDecision {
        if self.is_granted(capability) {
            PermissionDecision::Granted
        } else {
            PermissionDecision::Denied
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_persist_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("permissions.toml");

        let store = GrantStore::new(&path);
        assert!(!store.has_permission(Capability::SendSms));
        assert_eq!(
            store.request_permission(Capability::SendSms),
            PermissionDecision::Denied
        );

        store.grant(Capability::SendSms).unwrap();
        let reopened = GrantStore::new(&path);
        assert!(reopened.has_permission(Capability::SendSms));
        assert_eq!(
            reopened.request_permission(Capability::SendSms),
            PermissionDecision::Granted
        );
    }

    #[test]
    fn capability_names() {
        assert_eq!(Capability::SendSms.to_string(), "send_sms");
    }
}
