//! Application and device lookup.
//!
//! The engine asks an [`AuthGate`] whether an application or device exists;
//! it never mutates them. [`MemoryAuthGate`] is a registry held in memory,
//! optionally loaded from a JSON document:
//!
//! ```json
//! {
//!   "applications": [{ "id": "<uuid>", "access_key": "<uuid>", "name": "Notes" }],
//!   "devices": [{ "id": "<uuid>" }]
//! }
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// A registered application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Application id.
    pub id: Uuid,
    /// Key clients must present with the id.
    pub access_key: Uuid,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Application {
    /// Creates an application.
    pub fn new(id: Uuid, access_key: Uuid) -> Self {
        Self {
            id,
            access_key,
            name: None,
        }
    }

    /// Checks `key` against the access key in constant time.
    ///
    /// The nil key never matches.
    pub fn verify_access_key(&self, key: Uuid) -> bool {
        let diff = self
            .access_key
            .as_bytes()
            .iter()
            .zip(key.as_bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        diff == 0 && !key.is_nil()
    }
}

/// A registered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Device id.
    pub id: Uuid,
}

/// Read-only lookup of applications and devices.
pub trait AuthGate: Send + Sync {
    /// Returns the application registered under `id`.
    fn get_application(&self, id: Uuid) -> Option<Application>;

    /// Returns the device registered under `id`.
    fn get_device(&self, id: Uuid) -> Option<Device>;
}

impl<T: AuthGate + ?Sized> AuthGate for Arc<T> {
    fn get_application(&self, id: Uuid) -> Option<Application> {
        (**self).get_application(id)
    }

    fn get_device(&self, id: Uuid) -> Option<Device> {
        (**self).get_device(id)
    }
}

/// Errors loading a registry document.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The file could not be read.
    #[error("failed to read registry: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not a valid registry.
    #[error("invalid registry document: {0}")]
    Json(#[from] serde_json::Error),
}

/// The serialized form of a [`MemoryAuthGate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    /// Registered applications.
    #[serde(default)]
    pub applications: Vec<Application>,
    /// Registered devices.
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// An in-memory registry of applications and devices.
#[derive(Debug, Default)]
pub struct MemoryAuthGate {
    applications: RwLock<HashMap<Uuid, Application>>,
    devices: RwLock<HashMap<Uuid, Device>>,
}

impl MemoryAuthGate {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the entries of `registry`.
    pub fn from_registry(registry: Registry) -> Self {
        let gate = Self::new();
        for application in registry.applications {
            gate.register_application(application);
        }
        for device in registry.devices {
            gate.register_device(device);
        }
        gate
    }

    /// Parses a registry document.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let registry: Registry = serde_json::from_str(json)?;
        Ok(Self::from_registry(registry))
    }

    /// Loads a registry document from `path`.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Adds or replaces an application.
    pub fn register_application(&self, application: Application) {
        self.applications.write().insert(application.id, application);
    }

    /// Adds or replaces a device.
    pub fn register_device(&self, device: Device) {
        self.devices.write().insert(device.id, device);
    }

    /// Returns the current entries, sorted by id.
    pub fn to_registry(&self) -> Registry {
        let mut applications: Vec<Application> =
            self.applications.read().values().cloned().collect();
        applications.sort_by_key(|application| application.id);
        let mut devices: Vec<Device> = self.devices.read().values().cloned().collect();
        devices.sort_by_key(|device| device.id);
        Registry {
            applications,
            devices,
        }
    }
}

impl AuthGate for MemoryAuthGate {
    fn get_application(&self, id: Uuid) -> Option<Application> {
        self.applications.read().get(&id).cloned()
    }

    fn get_device(&self, id: Uuid) -> Option<Device> {
        self.devices.read().get(&id).cloned()
    }
}
