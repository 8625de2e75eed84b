use crate::cooker_registry::CookerRegistry;
use crate::depot::Depot;
use crate::{
    CookedResource, Cooker, DependencyTracker, Metadata, PipelineError, PipelineResult, Resource,
    ResourceKey, ResourceLoader, ResourcePtr, SourceDependency, TypeRegistry,
};
use kiln_base::hashing::{HashMap, HashSet};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

/// Implemented by live objects that hold resource references and want to be
/// notified when a resource is swapped during hot reload. Returning true from
/// `on_resource_reloading` marks the object as affected.
pub trait ReloadObserver: Send + Sync {
    fn on_resource_reloading(
        &self,
        old_resource: &ResourcePtr,
        new_resource: &ResourcePtr,
    ) -> bool;

    fn on_resource_reload_finished(
        &self,
        old_resource: &ResourcePtr,
        new_resource: &ResourcePtr,
    );
}

/// Capability to iterate every live object that may hold resource
/// references. Injected so tests can use a small fixed object set instead of
/// a process-wide registry.
pub trait LiveObjectDirectory: Send + Sync {
    fn iterate_objects(
        &self,
        callback: &mut dyn FnMut(&dyn ReloadObserver),
    );
}

/// A directory with no live objects; useful for batch tools that never hold
/// resources across updates.
pub struct NoLiveObjects;

impl LiveObjectDirectory for NoLiveObjects {
    fn iterate_objects(
        &self,
        _callback: &mut dyn FnMut(&dyn ReloadObserver),
    ) {
    }
}

struct LoadedResourceEntry {
    resource: Weak<dyn Resource>,
    metadata: Option<Arc<Metadata>>,
}

struct LoaderState {
    loaded_resources: HashMap<ResourceKey, LoadedResourceEntry>,
    loading_in_flight: HashSet<ResourceKey>,
    pending_reload_set: HashSet<ResourceKey>,
    pending_reload_queue: VecDeque<ResourceKey>,
}

struct ReloadState {
    current_key: Option<ResourceKey>,
    current_resource: Option<ResourcePtr>,
    reloaded_resource: Option<CookedResource>,
    finished: bool,
}

/// Resource loader with live-reload support. Loads run the normal direct or
/// cook path and feed the dependency tracker; when tracked source files
/// change, affected loaded resources are queued and reloaded one at a time
/// on a background task, with completion polled from the main-thread
/// `update()` tick (never blocking it).
pub struct ReloadingResourceLoader {
    depot: Arc<dyn Depot>,
    type_registry: TypeRegistry,
    cooker: Cooker,
    dependency_tracker: Arc<DependencyTracker>,
    live_objects: Arc<dyn LiveObjectDirectory>,
    state: Mutex<LoaderState>,
    reload: Mutex<ReloadState>,
    // Handed to the reload worker thread so it can call back into the loader
    self_weak: Weak<ReloadingResourceLoader>,
}

impl ReloadingResourceLoader {
    pub fn new(
        depot: Arc<dyn Depot>,
        type_registry: TypeRegistry,
        cooker_registry: CookerRegistry,
        dependency_tracker: Arc<DependencyTracker>,
        live_objects: Arc<dyn LiveObjectDirectory>,
    ) -> Arc<Self> {
        let cooker = Cooker::new(
            depot.clone(),
            type_registry.clone(),
            cooker_registry,
            false,
            None,
        );

        Arc::new_cyclic(|self_weak| ReloadingResourceLoader {
            depot,
            type_registry,
            cooker,
            dependency_tracker,
            live_objects,
            state: Mutex::new(LoaderState {
                loaded_resources: HashMap::default(),
                loading_in_flight: HashSet::default(),
                pending_reload_set: HashSet::default(),
                pending_reload_queue: VecDeque::default(),
            }),
            reload: Mutex::new(ReloadState {
                current_key: None,
                current_resource: None,
                reloaded_resource: None,
                finished: false,
            }),
            self_weak: self_weak.clone(),
        })
    }

    pub fn dependency_tracker(&self) -> &Arc<DependencyTracker> {
        &self.dependency_tracker
    }

    /// Entry point for file watchers: report that a source file changed on
    /// disk.
    pub fn notify_file_changed(
        &self,
        path: &str,
    ) {
        self.dependency_tracker.notify_file_changed(path);
    }

    /// True while a reload is in flight.
    pub fn is_reloading(&self) -> bool {
        self.reload.lock().unwrap().current_key.is_some()
    }

    /// Main-thread tick: drains the change notifications, starts the next
    /// queued reload when idle, or applies a finished one.
    #[profiling::function]
    pub fn update(&self) {
        // Check what files changed and queue the loaded resources that
        // depend on them
        self.check_changed_files();

        if !self.is_reloading() {
            self.start_reloading();
        } else if let Some((key, old_resource, new_resource)) = self.try_finish_reloading() {
            self.apply_reloading(&key, old_resource, new_resource);
        }
    }

    //--

    fn check_changed_files(&self) {
        let mut changed_files = Vec::default();
        self.dependency_tracker
            .query_files_for_reloading(&mut changed_files);

        if changed_files.is_empty() {
            return;
        }

        log::info!(
            "Dependency tracker reported {} file(s) to reload",
            changed_files.len()
        );

        let mut state = self.state.lock().unwrap();
        for key in changed_files {
            if state.pending_reload_set.contains(&key) {
                log::info!("File '{}' is already on the reloading queue", key);
                continue;
            }

            if state.loading_in_flight.contains(&key) {
                log::info!(
                    "File '{}' was changed while loading, file will be reloaded once loading is done",
                    key
                );
                state.pending_reload_set.insert(key.clone());
                state.pending_reload_queue.push_back(key);
                continue;
            }

            let currently_loaded = state
                .loaded_resources
                .get(&key)
                .map(|entry| entry.resource.strong_count() > 0)
                .unwrap_or(false);

            if currently_loaded {
                log::info!("Resource '{}' flagged for reloading", key);
                state.pending_reload_set.insert(key.clone());
                state.pending_reload_queue.push_back(key);
            } else {
                // Not loaded: nothing to reload, the new version is picked up
                // automatically on the next load
                log::info!(
                    "Resource '{}' not currently loaded, new version will be automatically loaded on next resource load",
                    key
                );
            }
        }
    }

    fn pickup_next_resource_for_reloading(
        &self,
        state: &mut LoaderState,
    ) -> Option<(ResourceKey, ResourcePtr)> {
        while let Some(key) = state.pending_reload_queue.front().cloned() {
            if !state.pending_reload_set.contains(&key) {
                log::info!("Resource '{}' is no longer scheduled for reloading", key);
                state.pending_reload_queue.pop_front();
                continue;
            }

            let loaded_resource = state
                .loaded_resources
                .get(&key)
                .and_then(|entry| entry.resource.upgrade());

            if let Some(resource) = loaded_resource {
                state.pending_reload_set.remove(&key);
                state.pending_reload_queue.pop_front();
                return Some((key, resource));
            }

            if state.loading_in_flight.contains(&key) {
                // Still loading; defer rather than racing two loads of the
                // same key
                log::info!("Resource '{}' scheduled for reload is still loading", key);
                return None;
            }

            log::info!("Resource '{}' scheduled for reload is no longer loaded", key);
            state.pending_reload_set.remove(&key);
            state.pending_reload_queue.pop_front();
        }

        None
    }

    fn start_reloading(&self) {
        let picked = {
            let mut state = self.state.lock().unwrap();
            self.pickup_next_resource_for_reloading(&mut state)
        };

        let Some((key, current_resource)) = picked else {
            return;
        };

        let Some(this) = self.self_weak.upgrade() else {
            return;
        };

        {
            let mut reload = self.reload.lock().unwrap();
            debug_assert!(reload.current_key.is_none());
            debug_assert!(!reload.finished);
            reload.current_key = Some(key.clone());
            reload.current_resource = Some(current_resource);
            reload.reloaded_resource = None;
            reload.finished = false;
        }

        std::thread::Builder::new()
            .name("Resource Reload".into())
            .spawn(move || {
                this.process_reloading(key);
            })
            .unwrap();
    }

    fn process_reloading(
        &self,
        key: ResourceKey,
    ) {
        log::info!("Reloading of '{}' started", key);

        let result = self.load_internal(&key);
        let mut reload = self.reload.lock().unwrap();
        match result {
            Ok(reloaded) => {
                log::info!("Reloading of '{}' finished", key);
                reload.reloaded_resource = Some(reloaded);
            }
            Err(e) => {
                log::info!("Reloading of '{}' failed: {}", key, e);
                reload.reloaded_resource = None;
            }
        }
        reload.finished = true;
    }

    /// Non-blocking completion check, so the main-thread tick never waits on
    /// the reload worker.
    fn try_finish_reloading(&self) -> Option<(ResourceKey, Option<ResourcePtr>, Option<CookedResource>)> {
        let mut reload = self.reload.lock().unwrap();
        if !reload.finished {
            return None;
        }

        let key = reload.current_key.take()?;
        let old_resource = reload.current_resource.take();
        let new_resource = reload.reloaded_resource.take();
        reload.finished = false;

        if let Some(new_resource) = &new_resource {
            let mut state = self.state.lock().unwrap();
            state.loaded_resources.insert(
                key.clone(),
                LoadedResourceEntry {
                    resource: Arc::downgrade(&new_resource.resource),
                    metadata: new_resource.metadata.clone(),
                },
            );
        }

        Some((key, old_resource, new_resource))
    }

    fn apply_reloading(
        &self,
        key: &ResourceKey,
        old_resource: Option<ResourcePtr>,
        new_resource: Option<CookedResource>,
    ) {
        let (Some(old_resource), Some(new_resource)) = (old_resource, new_resource) else {
            return;
        };

        let timer = Instant::now();
        log::info!("Applying reload to '{}'", key);

        old_resource.apply_reload(&new_resource.resource);

        // Full sweep over every live object; a known cost center, paid once
        // per reload
        let mut num_objects_visited = 0u32;
        let mut num_objects_patched = 0u32;
        self.live_objects.iterate_objects(&mut |object| {
            num_objects_visited += 1;
            if object.on_resource_reloading(&old_resource, &new_resource.resource) {
                object.on_resource_reload_finished(&old_resource, &new_resource.resource);
                num_objects_patched += 1;
            }
        });

        log::info!(
            "Reload to '{}' applied in {:.2?}, {} of {} objects patched",
            key,
            timer.elapsed(),
            num_objects_patched,
            num_objects_visited
        );
    }

    //--

    fn validate_existing_resource(
        &self,
        metadata: Option<&Arc<Metadata>>,
        key: &ResourceKey,
    ) -> bool {
        let Some(metadata) = metadata else {
            return true;
        };

        for dep in &metadata.source_dependencies {
            if dep.directory_listing {
                continue;
            }

            let info = self.depot.query_file_info(&dep.source_path).unwrap_or_default();
            if info.size != dep.size || info.timestamp != dep.timestamp {
                log::warn!(
                    "Dependency of file '{}' a file ({}) has changed. We will force resource to load a new version.",
                    key,
                    dep.source_path
                );
                return false;
            }
        }

        true
    }

    /// Direct load of a text resource whose file extension equals its
    /// class's load extension. Stamps a single-dependency metadata (with no
    /// cooker class, marking a direct copy) so staleness and reload tracking
    /// work for uncooked resources too.
    fn load_directly(
        &self,
        key: &ResourceKey,
    ) -> PipelineResult<CookedResource> {
        let text_loader = self.type_registry.text_loader(key.class()).ok_or_else(|| {
            format!(
                "Resource class '{}' has no text form and cannot be loaded directly",
                key.class()
            )
        })?;

        let mut reader = self
            .depot
            .create_file_reader(key.path())
            .ok_or_else(|| PipelineError::ResourceNotFound(key.path().to_string()))?;
        let mut content = Vec::default();
        std::io::Read::read_to_end(&mut reader, &mut content)?;

        let resource = text_loader(&content)?;

        let info = self.depot.query_file_info(key.path()).unwrap_or_default();
        let metadata = Metadata {
            cooker_class: String::default(),
            cooker_version: 0,
            resource_class: key.class().clone(),
            resource_data_version: self.type_registry.data_version(key.class()).unwrap_or(0),
            source_dependencies: vec![SourceDependency::new(
                key.path(),
                info.timestamp,
                info.size,
            )],
        };

        Ok(CookedResource {
            resource,
            metadata: Some(Arc::new(metadata)),
        })
    }

    fn load_internal(
        &self,
        key: &ResourceKey,
    ) -> PipelineResult<CookedResource> {
        // Direct load when the file is already in the class's own format
        let file_extension = kiln_base::depot_path::extension(key.path());
        let load_extension = self.type_registry.load_extension(key.class());
        if file_extension.is_some() && file_extension == load_extension {
            let loaded = self.load_directly(key)?;
            if let Some(metadata) = &loaded.metadata {
                self.dependency_tracker
                    .notify_dependencies_changed(key, &metadata.source_dependencies);
            }
            return Ok(loaded);
        }

        // The file can't be loaded directly, can we cook it?
        if self.cooker.can_cook(key).is_some() {
            let cooked = self.cooker.cook(key, self)?;
            if let Some(metadata) = &cooked.metadata {
                self.dependency_tracker
                    .notify_dependencies_changed(key, &metadata.source_dependencies);
            }
            return Ok(cooked);
        }

        Err(PipelineError::NotCookable(format!(
            "Resource '{}' can neither be loaded directly nor cooked",
            key
        )))
    }
}

impl ResourceLoader for ReloadingResourceLoader {
    fn load_resource(
        &self,
        key: &ResourceKey,
    ) -> PipelineResult<CookedResource> {
        {
            let mut state = self.state.lock().unwrap();

            if state.pending_reload_set.remove(key) {
                log::info!(
                    "Resource '{}' was loaded again before reload queue was processed",
                    key
                );
            }

            // Reuse a still-live loaded resource if its recorded sources are
            // unchanged
            if let Some(entry) = state.loaded_resources.get(key) {
                if let Some(resource) = entry.resource.upgrade() {
                    if self.validate_existing_resource(entry.metadata.as_ref(), key) {
                        return Ok(CookedResource {
                            resource,
                            metadata: entry.metadata.clone(),
                        });
                    }
                }
            }

            state.loading_in_flight.insert(key.clone());
        }

        let result = self.load_internal(key);

        {
            let mut state = self.state.lock().unwrap();
            state.loading_in_flight.remove(key);
            if let Ok(loaded) = &result {
                state.loaded_resources.insert(
                    key.clone(),
                    LoadedResourceEntry {
                        resource: Arc::downgrade(&loaded.resource),
                        metadata: loaded.metadata.clone(),
                    },
                );
            }
        }

        result
    }
}
