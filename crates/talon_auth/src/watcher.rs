use crate::policy::AccessPolicy;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::{debug, warn};

/// One watcher multiplexing every policy document, instead of a thread per
/// watched file. Dropping it stops the watch thread.
pub struct PolicyWatcher {
    _watcher: RecommendedWatcher,
}

#[derive(Deserialize)]
struct AllowEntry {
    uuid: String,
}

impl PolicyWatcher {
    /// Loads both documents once, then watches their parent directories and
    /// swaps the corresponding policy state on every modification.
    pub fn spawn(
        policy: AccessPolicy,
        allow_list: PathBuf,
        flags: PathBuf,
    ) -> notify::Result<Self> {
        reload_allow_list(&policy, &allow_list);
        reload_enabled_flag(&policy, &flags);

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(tx)?;

        // Watch the directories, not the files: editors and the host server
        // replace these documents by rename, which would silently detach a
        // per-file watch.
        let mut parents: Vec<&Path> = Vec::new();
        for path in [&allow_list, &flags] {
            if let Some(parent) = path.parent() {
                if !parents.contains(&parent) {
                    watcher.watch(parent, RecursiveMode::NonRecursive)?;
                    parents.push(parent);
                }
            }
        }

        let thread = std::thread::Builder::new().name("talon-policy-watcher".to_string());
        thread
            .spawn(move || {
                for result in rx {
                    let event = match result {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("policy watcher error: {e}");
                            continue;
                        }
                    };
                    if touches(&event, &allow_list) {
                        reload_allow_list(&policy, &allow_list);
                    }
                    if touches(&event, &flags) {
                        reload_enabled_flag(&policy, &flags);
                    }
                }
                debug!("policy watcher stopped");
            })
            .map_err(|e| notify::Error::generic(&e.to_string()))?;

        Ok(Self { _watcher: watcher })
    }
}

fn touches(event: &Event, file: &Path) -> bool {
    event
        .paths
        .iter()
        .any(|p| p.file_name() == file.file_name())
}

/// Replaces the allow-set from the allow-list document: a JSON array of
/// objects each carrying a `uuid` identity string.
///
/// A malformed, unreadable or empty document keeps the prior state. A
/// transient partial write must not clear the set and lock every client out.
pub fn reload_allow_list(policy: &AccessPolicy, path: &Path) {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("failed to read allow-list {}: {e}", path.display());
            return;
        }
    };
    let entries: Vec<AllowEntry> = match serde_json::from_str(&content) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(
                "malformed allow-list {}, keeping previous state: {e}",
                path.display()
            );
            return;
        }
    };
    if entries.is_empty() {
        warn!(
            "allow-list {} is empty, keeping previous state",
            path.display()
        );
        return;
    }

    let identities: HashSet<String> = entries.into_iter().map(|e| e.uuid).collect();
    debug!("allow-list reloaded with {} identities", identities.len());
    policy.replace_allowed(identities);
}

/// Replaces the enabled flag from the line-oriented properties document:
/// enabled exactly when a `white-list=true` line is present. An unreadable
/// document keeps the prior state.
pub fn reload_enabled_flag(policy: &AccessPolicy, path: &Path) {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("failed to read flag document {}: {e}", path.display());
            return;
        }
    };
    let enabled = content.lines().any(|line| line.trim() == "white-list=true");
    debug!("allow-list enforcement set to {enabled}");
    policy.set_enabled(enabled);
}
