// Versioned store of calibration parameter sets.
//
// Every promoted parameter set is kept as an immutable version. Exactly one
// version is current; switching is a single index update under a write lock,
// so readers observe either the old set or the new one, never a mix.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::valuation::params::CalibrationParameters;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("parameter version {0} does not exist")]
    UnknownVersion(u64),
}

/// One immutable parameter set plus provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterVersion {
    pub version: u64,
    /// Calibration run that produced the set, `None` for built-in defaults.
    pub run_id: Option<Uuid>,
    pub parameters: CalibrationParameters,
    pub promoted_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Versions {
    all: Vec<Arc<ParameterVersion>>,
    current: usize,
}

/// In-process registry of parameter versions.
#[derive(Debug)]
pub struct ParameterRegistry {
    inner: RwLock<Versions>,
}

impl ParameterRegistry {
    /// Start with the built-in defaults as version 0.
    pub fn with_defaults() -> Self {
        Self::from_version(ParameterVersion {
            version: 0,
            run_id: None,
            parameters: CalibrationParameters::default(),
            promoted_at: Utc::now(),
        })
    }

    /// Start from an already-persisted version.
    pub fn from_version(initial: ParameterVersion) -> Self {
        Self {
            inner: RwLock::new(Versions {
                all: vec![Arc::new(initial)],
                current: 0,
            }),
        }
    }

    /// The active parameter set.
    pub fn current(&self) -> Arc<ParameterVersion> {
        let versions = self.read();
        Arc::clone(&versions.all[versions.current])
    }

    /// Register a version loaded from storage and make it current. Its
    /// version number is kept as-is.
    pub fn install(&self, version: ParameterVersion) -> Arc<ParameterVersion> {
        let mut versions = self.write();
        let version = Arc::new(version);
        match versions.all.iter().position(|v| v.version == version.version) {
            Some(idx) => versions.current = idx,
            None => {
                versions.all.push(Arc::clone(&version));
                versions.current = versions.all.len() - 1;
            }
        }
        Arc::clone(&versions.all[versions.current])
    }

    /// Make an earlier version current again.
    pub fn reactivate(&self, version: u64) -> Result<Arc<ParameterVersion>, RegistryError> {
        let mut versions = self.write();
        let idx = versions
            .all
            .iter()
            .position(|v| v.version == version)
            .ok_or(RegistryError::UnknownVersion(version))?;
        versions.current = idx;
        Ok(Arc::clone(&versions.all[idx]))
    }

    /// Every registered version in registration order.
    pub fn history(&self) -> Vec<Arc<ParameterVersion>> {
        self.read().all.clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Versions> {
        // The guarded data is only ever replaced wholesale, so a poisoned
        // lock still holds a consistent value.
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Versions> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ParameterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
