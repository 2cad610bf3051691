use semver::Version;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use talon_core::checksum::checksum;
use talon_core::error::ManifestError;
use talon_core::manifest::{ManifestEntry, PackManifest};
use tracing::{debug, info, warn};

/// Well-known name of the persisted manifest inside the managed directory.
pub const MANIFEST_FILE: &str = "servermanifest.json";

/// How a candidate file participates in manifest building. The host's
/// scanning layer classifies files; the builder only groups and selects.
#[derive(Debug, Clone)]
pub enum FileKind {
    /// Part of a logical unit that may exist in several versions; only the
    /// newest version per group ships.
    Grouped { group_id: String, version: String },
    /// A file with no version semantics, e.g. a resource pack. Its own file
    /// name is its group id.
    Standalone,
}

#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub kind: FileKind,
}

impl CandidateFile {
    pub fn grouped(path: impl Into<PathBuf>, group_id: &str, version: &str) -> Self {
        Self {
            path: path.into(),
            kind: FileKind::Grouped {
                group_id: group_id.to_string(),
                version: version.to_string(),
            },
        }
    }

    pub fn standalone(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileKind::Standalone,
        }
    }

    fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

struct Inner {
    root: PathBuf,
    manifest_path: PathBuf,
    excluded: HashSet<String>,
    manifest: RwLock<Arc<PackManifest>>,
}

/// Owns the managed directory and the manifest built from it.
///
/// The manifest is effectively immutable per server run: handlers read a
/// shared `Arc`, and a rebuild swaps a freshly built document in without
/// racing in-flight readers.
#[derive(Clone)]
pub struct ServerFileManager {
    inner: Arc<Inner>,
}

impl ServerFileManager {
    /// Builds (or reloads) the manifest for the given candidate set and
    /// persists it to the well-known path.
    ///
    /// The persisted copy is reused only when every file it lists is still
    /// present among the candidates; any mismatch regenerates from the live
    /// file set.
    pub fn initialize(
        root: &Path,
        excluded_group_ids: &[String],
        candidates: &[CandidateFile],
    ) -> Result<Self, ManifestError> {
        let manifest_path = root.join(MANIFEST_FILE);
        let excluded: HashSet<String> = excluded_group_ids.iter().cloned().collect();

        let manifest = match PackManifest::load(&manifest_path) {
            Ok(persisted) if is_consistent(&persisted, candidates) => {
                debug!("reusing persisted manifest at {}", manifest_path.display());
                persisted
            }
            Ok(_) => {
                info!("persisted manifest no longer matches the file set, regenerating");
                let fresh = build_manifest(candidates, &excluded)?;
                fresh.save(&manifest_path)?;
                fresh
            }
            Err(_) => {
                info!("no usable persisted manifest, generating a new one");
                let fresh = build_manifest(candidates, &excluded)?;
                fresh.save(&manifest_path)?;
                fresh
            }
        };

        Ok(Self {
            inner: Arc::new(Inner {
                root: root.to_path_buf(),
                manifest_path,
                excluded,
                manifest: RwLock::new(Arc::new(manifest)),
            }),
        })
    }

    pub fn manifest(&self) -> Arc<PackManifest> {
        self.inner
            .manifest
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn manifest_json(&self) -> Result<String, ManifestError> {
        self.manifest().to_json()
    }

    /// Rebuilds from a changed candidate set: copy-on-rebuild, then an
    /// atomic pointer swap. Readers holding the old manifest are unaffected.
    pub fn rebuild(&self, candidates: &[CandidateFile]) -> Result<(), ManifestError> {
        let fresh = build_manifest(candidates, &self.inner.excluded)?;
        fresh.save(&self.inner.manifest_path)?;
        let mut slot = self
            .inner
            .manifest
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *slot = Arc::new(fresh);
        Ok(())
    }

    /// Reads a served file by its manifest name. `None` covers both absent
    /// and unreadable files as well as names trying to leave the managed
    /// directory.
    pub fn read_file(&self, name: &str) -> Option<Vec<u8>> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            warn!("rejecting suspicious file name {name:?}");
            return None;
        }
        match fs::read(self.inner.root.join(name)) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!("failed to read file {name}: {e}");
                None
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }
}

fn is_consistent(manifest: &PackManifest, candidates: &[CandidateFile]) -> bool {
    let present: HashSet<&str> = candidates.iter().filter_map(CandidateFile::file_name).collect();
    manifest
        .entries
        .iter()
        .all(|entry| present.contains(entry.file_name.as_str()))
}

struct GroupedCandidate<'a> {
    version: Option<Version>,
    file_name: &'a str,
    path: &'a Path,
}

/// Deterministically selects one file per logical unit and checksums it.
///
/// Standalone files come first sorted by name, then grouped units sorted by
/// group id. Within a group the newest semantic version wins; older
/// duplicates are silently dropped by design. Versions that do not parse
/// sort below every parseable one, and equal versions fall back to the file
/// name so the winner is stable across runs.
pub fn build_manifest(
    candidates: &[CandidateFile],
    excluded: &HashSet<String>,
) -> Result<PackManifest, ManifestError> {
    let mut entries = Vec::new();

    let mut standalone: Vec<(&str, &Path)> = Vec::new();
    let mut groups: BTreeMap<&str, Vec<GroupedCandidate<'_>>> = BTreeMap::new();
    for candidate in candidates {
        let Some(file_name) = candidate.file_name() else {
            warn!("skipping candidate with unusable name: {}", candidate.path.display());
            continue;
        };
        match &candidate.kind {
            FileKind::Standalone => standalone.push((file_name, &candidate.path)),
            FileKind::Grouped { group_id, version } => {
                groups.entry(group_id.as_str()).or_default().push(GroupedCandidate {
                    version: Version::parse(version).ok(),
                    file_name,
                    path: &candidate.path,
                });
            }
        }
    }

    standalone.sort_by_key(|(file_name, _)| *file_name);
    for (file_name, path) in standalone {
        if excluded.contains(file_name) {
            debug!("excluding standalone file {file_name}");
            continue;
        }
        entries.push(entry_for(file_name, file_name, path)?);
    }

    for (group_id, mut group) in groups {
        if excluded.contains(group_id) {
            debug!("excluding group {group_id}");
            continue;
        }
        group.sort_by(|a, b| match (&a.version, &b.version) {
            (Some(va), Some(vb)) => vb.cmp(va).then_with(|| a.file_name.cmp(b.file_name)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.file_name.cmp(b.file_name),
        });
        let newest = &group[0];
        if group.len() > 1 {
            debug!(
                "group {group_id} has {} candidates, shipping {}",
                group.len(),
                newest.file_name
            );
        }
        entries.push(entry_for(group_id, newest.file_name, newest.path)?);
    }

    Ok(PackManifest::new(entries))
}

fn entry_for(group_id: &str, file_name: &str, path: &Path) -> Result<ManifestEntry, ManifestError> {
    let digest = checksum(path)?
        .ok_or_else(|| ManifestError::MissingChecksum(file_name.to_string()))?;
    Ok(ManifestEntry {
        group_id: group_id.to_string(),
        file_name: file_name.to_string(),
        checksum: digest,
    })
}
