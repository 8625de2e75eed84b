use crate::{ResourceKey, SourceDependency};
use kiln_base::hashing::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// One source path ever observed as a dependency. Lives in the directory
// tree; holds back-references to every cooked resource that consumed it.
struct TrackedDepotFile {
    users: Mutex<HashSet<ResourceKey>>,
}

// One cooked output ever observed. The changed flag is exchanged atomically
// so a burst of file-change notifications delivers each key exactly once.
struct TrackedCookedFile {
    key: ResourceKey,
    source_files: Mutex<Vec<String>>,
    changed: AtomicBool,
}

#[derive(Default)]
struct TrackedDirectory {
    subdirectories: Mutex<HashMap<String, Arc<TrackedDirectory>>>,
    files: Mutex<HashMap<String, Arc<TrackedDepotFile>>>,
}

/// In-memory graph mapping source files to the cooked resources that depend
/// on them, with reverse lookup for "what changed" queries. The index is
/// shaped like the depot's directory tree; each node guards only its own
/// state, so concurrent updates to different files never contend.
pub struct DependencyTracker {
    root: TrackedDirectory,
    cooked_files: Mutex<HashMap<ResourceKey, Arc<TrackedCookedFile>>>,
    // Aggregate list of keys whose sources changed since the last query
    changed_list: Mutex<Vec<ResourceKey>>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        DependencyTracker {
            root: TrackedDirectory::default(),
            cooked_files: Mutex::default(),
            changed_list: Mutex::default(),
        }
    }

    fn tracked_file(
        &self,
        path: &str,
        create_if_missing: bool,
    ) -> Option<Arc<TrackedDepotFile>> {
        let file_name = kiln_base::depot_path::file_name(path);
        if file_name.is_empty() {
            return None;
        }

        let mut current: Option<Arc<TrackedDirectory>> = None;
        for segment in kiln_base::depot_path::directory(path)
            .split('/')
            .filter(|s| !s.is_empty())
        {
            let next = {
                let node = current.as_deref().unwrap_or(&self.root);
                let mut subdirectories = node.subdirectories.lock().unwrap();
                if create_if_missing {
                    subdirectories
                        .entry(segment.to_string())
                        .or_insert_with(|| Arc::new(TrackedDirectory::default()))
                        .clone()
                } else {
                    subdirectories.get(segment)?.clone()
                }
            };
            current = Some(next);
        }

        let node = current.as_deref().unwrap_or(&self.root);
        let mut files = node.files.lock().unwrap();
        if create_if_missing {
            Some(
                files
                    .entry(file_name.to_string())
                    .or_insert_with(|| {
                        Arc::new(TrackedDepotFile {
                            users: Mutex::default(),
                        })
                    })
                    .clone(),
            )
        } else {
            files.get(file_name).cloned()
        }
    }

    /// Replaces the recorded source set of a cooked resource. Old edges are
    /// removed and new edges added, never accumulated.
    pub fn notify_dependencies_changed(
        &self,
        key: &ResourceKey,
        dependencies: &[SourceDependency],
    ) {
        let cooked = {
            let mut cooked_files = self.cooked_files.lock().unwrap();
            cooked_files
                .entry(key.clone())
                .or_insert_with(|| {
                    Arc::new(TrackedCookedFile {
                        key: key.clone(),
                        source_files: Mutex::default(),
                        changed: AtomicBool::new(false),
                    })
                })
                .clone()
        };

        let new_sources: Vec<String> = dependencies
            .iter()
            .filter(|dep| !dep.directory_listing)
            .map(|dep| dep.source_path.clone())
            .collect();

        let old_sources = {
            let mut source_files = cooked.source_files.lock().unwrap();
            std::mem::replace(&mut *source_files, new_sources.clone())
        };

        for old_path in &old_sources {
            if new_sources.contains(old_path) {
                continue;
            }
            if let Some(file) = self.tracked_file(old_path, false) {
                file.users.lock().unwrap().remove(key);
            }
        }

        for new_path in &new_sources {
            if let Some(file) = self.tracked_file(new_path, true) {
                file.users.lock().unwrap().insert(key.clone());
            }
        }

        log::debug!(
            "Tracked {} source dependencie(s) for '{}'",
            new_sources.len(),
            key
        );
    }

    /// Forgets a cooked resource entirely (it was unloaded and will not be
    /// reloaded).
    pub fn remove_tracked_resource(
        &self,
        key: &ResourceKey,
    ) {
        let removed = self.cooked_files.lock().unwrap().remove(key);
        if let Some(cooked) = removed {
            let sources = cooked.source_files.lock().unwrap().clone();
            for path in &sources {
                if let Some(file) = self.tracked_file(path, false) {
                    file.users.lock().unwrap().remove(key);
                }
            }
        }
    }

    /// Reports that a source file changed on disk. Every cooked resource
    /// using it is flagged; a resource already flagged since the last query
    /// is not flagged again.
    pub fn notify_file_changed(
        &self,
        path: &str,
    ) {
        let Some(file) = self.tracked_file(path, false) else {
            return;
        };

        let users: Vec<ResourceKey> = file.users.lock().unwrap().iter().cloned().collect();
        if users.is_empty() {
            return;
        }

        log::info!(
            "Source file '{}' changed, {} user(s) affected",
            path,
            users.len()
        );

        let cooked_files = self.cooked_files.lock().unwrap();
        for key in users {
            if let Some(cooked) = cooked_files.get(&key) {
                // Exactly-once per change burst
                if !cooked.changed.swap(true, Ordering::AcqRel) {
                    self.changed_list.lock().unwrap().push(cooked.key.clone());
                }
            }
        }
    }

    /// Atomically drains the changed list and clears the per-resource flags,
    /// so the next change burst is delivered again.
    pub fn query_files_for_reloading(
        &self,
        out_changed: &mut Vec<ResourceKey>,
    ) {
        let drained = std::mem::take(&mut *self.changed_list.lock().unwrap());
        if drained.is_empty() {
            return;
        }

        let cooked_files = self.cooked_files.lock().unwrap();
        for key in drained {
            if let Some(cooked) = cooked_files.get(&key) {
                cooked.changed.store(false, Ordering::Release);
            }
            out_changed.push(key);
        }
    }
}
