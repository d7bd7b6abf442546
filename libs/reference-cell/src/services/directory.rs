// libs/reference-cell/src/services/directory.rs
use std::collections::HashMap;
use std::fs;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use shared_config::AppConfig;

use crate::error::ReferenceError;
use crate::models::{is_placeholder_name, ReferenceRole};

/// On-disk / environment shape of the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    #[serde(default)]
    pub patients: HashMap<String, String>,
    #[serde(default)]
    pub doctors: HashMap<String, String>,
}

/// Last-known-good identity → display name table, one per reference role.
///
/// Seeded from configuration and refreshed by every successful reference fetch.
/// Used while a fetch is pending and when it fails.
#[derive(Debug, Default)]
pub struct LastKnownGoodDirectory {
    patients: RwLock<HashMap<String, String>>,
    doctors: RwLock<HashMap<String, String>>,
}

impl LastKnownGoodDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Self {
        Self {
            patients: RwLock::new(snapshot.patients),
            doctors: RwLock::new(snapshot.doctors),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, ReferenceError> {
        let snapshot: DirectorySnapshot =
            serde_json::from_str(raw).map_err(|e| ReferenceError::DirectoryConfig(e.to_string()))?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Inline JSON wins over the file path; neither configured gives an empty directory.
    pub fn from_config(config: &AppConfig) -> Result<Self, ReferenceError> {
        let directory = if let Some(raw) = &config.last_known_good_directory {
            Self::from_json(raw)?
        } else if let Some(path) = &config.last_known_good_directory_path {
            let raw = fs::read_to_string(path)
                .map_err(|e| ReferenceError::DirectoryConfig(format!("{}: {}", path, e)))?;
            Self::from_json(&raw)?
        } else {
            Self::new()
        };

        info!(
            "Last-known-good directory loaded: {} patients, {} doctors",
            directory.len(ReferenceRole::Patient),
            directory.len(ReferenceRole::Doctor)
        );

        Ok(directory)
    }

    fn table(&self, role: ReferenceRole) -> &RwLock<HashMap<String, String>> {
        match role {
            ReferenceRole::Patient => &self.patients,
            ReferenceRole::Doctor => &self.doctors,
        }
    }

    pub fn lookup(&self, role: ReferenceRole, identity: &str) -> Option<String> {
        self.table(role)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
    }

    /// Records a name seen on a successful fetch. Placeholder names are ignored.
    pub fn remember(&self, role: ReferenceRole, identity: &str, display_name: &str) {
        if is_placeholder_name(display_name) {
            return;
        }

        debug!("Remembering {} {} as {}", role, identity, display_name);
        self.table(role)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.to_string(), display_name.to_string());
    }

    pub fn len(&self, role: ReferenceRole) -> usize {
        self.table(role).read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_inline_json() {
        let directory = LastKnownGoodDirectory::from_json(
            r#"{ "patients": { "6": "Tanuj Kulal" }, "doctors": { "12": "Dr. Rao" } }"#,
        )
        .expect("valid json");

        assert_eq!(directory.lookup(ReferenceRole::Patient, "6").as_deref(), Some("Tanuj Kulal"));
        assert_eq!(directory.lookup(ReferenceRole::Doctor, "12").as_deref(), Some("Dr. Rao"));
        assert_eq!(directory.lookup(ReferenceRole::Doctor, "6"), None);
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let directory = LastKnownGoodDirectory::from_json(r#"{ "doctors": {} }"#).expect("valid json");
        assert_eq!(directory.len(ReferenceRole::Patient), 0);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        assert!(matches!(
            LastKnownGoodDirectory::from_json("not json"),
            Err(ReferenceError::DirectoryConfig(_))
        ));
    }

    #[test]
    fn loads_from_configured_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "patients": {{ "6": "Tanuj Kulal" }} }}"#).expect("write");

        let config = AppConfig {
            last_known_good_directory_path: Some(file.path().display().to_string()),
            ..AppConfig::default()
        };

        let directory = LastKnownGoodDirectory::from_config(&config).expect("loads");
        assert_eq!(directory.lookup(ReferenceRole::Patient, "6").as_deref(), Some("Tanuj Kulal"));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let config = AppConfig {
            last_known_good_directory_path: Some("/nonexistent/directory.json".to_string()),
            ..AppConfig::default()
        };
        assert!(LastKnownGoodDirectory::from_config(&config).is_err());
    }

    #[test]
    fn remember_skips_placeholders() {
        let directory = LastKnownGoodDirectory::new();
        directory.remember(ReferenceRole::Patient, "6", "Unknown Patient");
        assert_eq!(directory.lookup(ReferenceRole::Patient, "6"), None);

        directory.remember(ReferenceRole::Patient, "6", "Tanuj Kulal");
        assert_eq!(directory.lookup(ReferenceRole::Patient, "6").as_deref(), Some("Tanuj Kulal"));
    }
}
