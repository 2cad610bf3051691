use crate::error::ManifestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Bumped whenever the entry layout or the checksum algorithm changes.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// One file the server wants clients to have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Logical unit this file belongs to, e.g. a mod id. Standalone files
    /// use their own file name. At most one entry per group survives into
    /// a manifest.
    pub group_id: String,

    /// Name of the file inside the managed directory; also the name used
    /// on the wire for `GET /files/{name}`.
    pub file_name: String,

    /// SHA-256 of the file content, lower-case hex.
    pub checksum: String,
}

/// The manifest is the server's source of truth for a pack: the set of files
/// a client should end up with, each with the checksum used to decide whether
/// a download is needed at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackManifest {
    pub format_version: u32,

    /// When this manifest was generated from the live file set.
    pub generated_at: DateTime<Utc>,

    pub entries: Vec<ManifestEntry>,
}

impl PackManifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self {
            format_version: MANIFEST_FORMAT_VERSION,
            generated_at: Utc::now(),
            entries,
        }
    }

    pub fn entry_for(&self, group_id: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.group_id == group_id)
    }

    pub fn to_json(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Persists the manifest as pretty JSON, via tmp-file-and-rename so a
    /// concurrent reader never observes a partial document.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, self.to_json()?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Filters a caller-supplied list of local files down to the ones this
    /// manifest approves, plus any the caller marks as always included.
    ///
    /// This is the boundary handed back to the host's file-scanning layer:
    /// only server-listed names (by file name) survive.
    pub fn approved_files(
        &self,
        local_files: &[PathBuf],
        always_include: &[String],
    ) -> Vec<PathBuf> {
        let approved: HashSet<&str> = self
            .entries
            .iter()
            .map(|e| e.file_name.as_str())
            .chain(always_include.iter().map(String::as_str))
            .collect();

        local_files
            .iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| approved.contains(n))
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> PackManifest {
        PackManifest::new(vec![
            ManifestEntry {
                group_id: "modA".into(),
                file_name: "modA-2.0.jar".into(),
                checksum: "abc".into(),
            },
            ManifestEntry {
                group_id: "pack.zip".into(),
                file_name: "pack.zip".into(),
                checksum: "def".into(),
            },
        ])
    }

    #[test]
    fn save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("servermanifest.json");

        let manifest = sample();
        manifest.save(&path).unwrap();
        let loaded = PackManifest::load(&path).unwrap();

        assert_eq!(loaded.format_version, MANIFEST_FORMAT_VERSION);
        assert_eq!(loaded.entries, manifest.entries);
    }

    #[test]
    fn wire_field_names_are_camel_case() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(value.get("formatVersion").is_some());
        assert!(value.get("generatedAt").is_some());
        let entry = &value["entries"][0];
        assert!(entry.get("groupId").is_some());
        assert!(entry.get("fileName").is_some());
        assert!(entry.get("checksum").is_some());
    }

    #[test]
    fn approved_files_filters_by_manifest_and_always_include() {
        let manifest = sample();
        let local = vec![
            PathBuf::from("/mods/modA-2.0.jar"),
            PathBuf::from("/mods/modA-1.0.jar"),
            PathBuf::from("/mods/pack.zip"),
            PathBuf::from("/mods/local-only.jar"),
        ];

        let approved = manifest.approved_files(&local, &["local-only.jar".into()]);

        assert_eq!(
            approved,
            vec![
                PathBuf::from("/mods/modA-2.0.jar"),
                PathBuf::from("/mods/pack.zip"),
                PathBuf::from("/mods/local-only.jar"),
            ]
        );
    }

    #[test]
    fn entry_lookup_by_group() {
        let manifest = sample();
        assert_eq!(
            manifest.entry_for("modA").map(|e| e.file_name.as_str()),
            Some("modA-2.0.jar")
        );
        assert!(manifest.entry_for("missing").is_none());
    }
}
