use crate::cooker_registry::CookerRegistry;
use crate::depot::Depot;
use crate::seed_file::{SeedFile, SEED_FILE_CLASS};
use crate::{
    check_dependencies_up_to_date, storage, CookLogData, CookedResource, Cooker, ResourceClassName,
    ResourceKey, ResourceLoader, SaveThread, TypeRegistry,
};
use kiln_base::hashing::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_FAILURE_ABORT_THRESHOLD: u32 = 100;

pub struct CookJobsConfig {
    /// Cooked outputs are written under `<output_root>/cooked/...`.
    pub output_root: PathBuf,
    /// Write per-file .log files beside the cooked outputs.
    pub capture_logs: bool,
    /// Retain per-file logs even when the cook succeeded.
    pub keep_all_logs: bool,
    /// Abort the whole run once this many cooks failed. Widespread failure
    /// means broken infrastructure, not per-asset problems.
    pub failure_abort_threshold: u32,
}

impl CookJobsConfig {
    pub fn new(output_root: PathBuf) -> Self {
        CookJobsConfig {
            output_root,
            capture_logs: true,
            keep_all_logs: false,
            failure_abort_threshold: DEFAULT_FAILURE_ABORT_THRESHOLD,
        }
    }
}

/// Counters accumulated over one cooking run. Returned by the run rather
/// than held as process-wide state so runs are re-entrant.
#[derive(Debug, Default, Clone, Copy)]
pub struct CookRunStatistics {
    pub visited: u32,
    pub up_to_date: u32,
    pub copied: u32,
    pub cooked: u32,
    pub failed: u32,
    pub aborted: bool,
}

impl CookRunStatistics {
    pub fn success(&self) -> bool {
        !self.aborted && self.failed == 0
    }
}

/// Unit of work on the cooking worklist.
struct PendingCookEntry {
    key: ResourceKey,
    // Carried when the resource was already loaded by the producer of this
    // entry, so the cook step can skip a redundant load
    #[allow(dead_code)]
    resource: Option<CookedResource>,
}

impl PendingCookEntry {
    fn new(key: ResourceKey) -> Self {
        PendingCookEntry {
            key,
            resource: None,
        }
    }
}

struct CookRunState {
    // Every key ever scheduled this run (seeds plus discovered references)
    all_collected_files: HashSet<ResourceKey>,
    // Keys already popped and evaluated; guarantees each key is visited at
    // most once even on cyclic reference graphs
    all_seen_files: HashSet<ResourceKey>,
    // Promoted (path, resolved class) pairs already cooked; prevents
    // duplicate cooks and duplicate save jobs for one output path
    all_cooked_files: HashSet<ResourceKey>,
    statistics: CookRunStatistics,
    log_data: CookLogData,
    cook_file_index: u32,
}

/// Breadth-of-reachability cooking walker: seeds plus everything they
/// reference, each key visited at most once, cooking or skipping as the
/// up-to-date check decides, with serialization handed off to the background
/// save thread.
pub struct CookJobs {
    depot: Arc<dyn Depot>,
    cooker: Cooker,
    loader: Arc<dyn ResourceLoader>,
    save_thread: SaveThread,
    config: CookJobsConfig,
    static_resources: Vec<ResourceKey>,
}

impl CookJobs {
    pub fn new(
        depot: Arc<dyn Depot>,
        type_registry: TypeRegistry,
        cooker_registry: CookerRegistry,
        loader: Arc<dyn ResourceLoader>,
        config: CookJobsConfig,
    ) -> Self {
        let cooker = Cooker::new(
            depot.clone(),
            type_registry,
            cooker_registry,
            true,
            None,
        );

        CookJobs {
            depot,
            cooker,
            loader,
            save_thread: SaveThread::new(),
            config,
            static_resources: Vec::default(),
        }
    }

    /// Declares an engine resource that must always be cooked, independent of
    /// any seed file.
    pub fn add_static_resource(
        &mut self,
        key: ResourceKey,
    ) {
        self.static_resources.push(key);
    }

    /// Runs a full cook. Returns the run statistics and the structured log.
    /// The run only counts as done once the save queue has drained.
    #[profiling::function]
    pub fn run(&mut self) -> (CookRunStatistics, Arc<CookLogData>) {
        let mut state = CookRunState {
            all_collected_files: HashSet::default(),
            all_seen_files: HashSet::default(),
            all_cooked_files: HashSet::default(),
            statistics: CookRunStatistics::default(),
            log_data: CookLogData::default(),
            cook_file_index: 0,
        };

        let seed_keys = self.collect_seed_files(&mut state);

        for (index, seed_key) in seed_keys.iter().enumerate() {
            log::info!(
                "Processing seed file {}/{}: {}",
                index + 1,
                seed_keys.len(),
                seed_key.path()
            );

            self.process_single_seed_file(seed_key, &mut state);

            if state.statistics.aborted {
                break;
            }
        }

        let statistics = &state.statistics;
        log::info!(
            "Visited {} files, {} up to date, {} copied, {} cooked and {} failed",
            statistics.visited,
            statistics.up_to_date,
            statistics.copied,
            statistics.cooked,
            statistics.failed
        );

        if !state.statistics.aborted {
            log::info!("Finished processing {} seed files.", seed_keys.len());
            // Cooking is not done while saves are still in flight
            self.save_thread.wait_until_done();
        }

        state.log_data.mark_finished();
        (state.statistics, Arc::new(state.log_data))
    }

    //--

    fn seed_file_extension(&self) -> String {
        self.cooker
            .type_registry()
            .load_extension(&ResourceClassName::from(SEED_FILE_CLASS))
            .unwrap_or(crate::seed_file::SEED_FILE_EXTENSION)
            .to_string()
    }

    fn scan_depot_directory_for_seed_files(
        &self,
        depot_path: &str,
        seed_file_suffix: &str,
        out_list: &mut Vec<ResourceKey>,
        out_num_directories_visited: &mut u32,
    ) {
        *out_num_directories_visited += 1;

        let mut file_names = Vec::default();
        self.depot.enum_files_at_path(depot_path, &mut |name| {
            if name.ends_with(seed_file_suffix) {
                file_names.push(name.to_string());
            }
        });
        file_names.sort();

        for name in file_names {
            let path = kiln_base::depot_path::join(depot_path, &name);
            out_list.push(ResourceKey::new(path, ResourceClassName::from(SEED_FILE_CLASS)));
        }

        let mut dir_names = Vec::default();
        self.depot.enum_directories_at_path(depot_path, &mut |name| {
            dir_names.push(name.to_string());
        });
        dir_names.sort();

        for name in dir_names {
            let sub_path = format!("{}{}/", depot_path, name);
            self.scan_depot_directory_for_seed_files(
                &sub_path,
                seed_file_suffix,
                out_list,
                out_num_directories_visited,
            );
        }
    }

    /// Collects the roots of the run: statically-declared engine resources
    /// plus the references listed by every seed file in the depot.
    fn collect_seed_files(
        &self,
        state: &mut CookRunState,
    ) -> Vec<ResourceKey> {
        let timer = Instant::now();
        let mut seeds = Vec::default();

        log::info!("Found {} static resources", self.static_resources.len());
        for key in &self.static_resources {
            if state.all_collected_files.insert(key.clone()) {
                log::info!("Collected static resource '{}'", key);
                seeds.push(key.clone());
            }
        }

        // Scan the depot for seed files
        let seed_file_suffix = format!(".{}", self.seed_file_extension());
        let mut seed_file_keys = Vec::default();
        let mut num_directories_visited = 0;
        self.scan_depot_directory_for_seed_files(
            "",
            &seed_file_suffix,
            &mut seed_file_keys,
            &mut num_directories_visited,
        );
        log::info!(
            "Found {} seed lists in {} depot directories",
            seed_file_keys.len(),
            num_directories_visited
        );

        // Load each seed file and pull in the resources it lists
        for seed_file_key in &seed_file_keys {
            let loaded = match self.loader.load_resource(seed_file_key) {
                Ok(loaded) => loaded,
                Err(e) => {
                    log::warn!("Unable to load seed file '{}': {}", seed_file_key, e);
                    state
                        .log_data
                        .warn(Some(seed_file_key), format!("Unable to load seed file: {}", e));
                    continue;
                }
            };

            let Some(seed_file) = loaded.resource.as_any().downcast_ref::<SeedFile>() else {
                log::warn!("Seed file '{}' did not load as a seed list", seed_file_key);
                continue;
            };

            let mut num_added = 0;
            let keys = seed_file.resolved_keys(seed_file_key.path(), &mut |entry, reason| {
                log::warn!(
                    "Unable to resolve seed entry '{}' in context of file '{}': {}",
                    entry.relative_path,
                    seed_file_key.path(),
                    reason
                );
            });

            for key in keys {
                if state.all_collected_files.insert(key.clone()) {
                    seeds.push(key);
                    num_added += 1;
                }
            }

            log::info!(
                "Loaded {} files from seed file '{}' ({} added to cook list)",
                seed_file.files.len(),
                seed_file_key.path(),
                num_added
            );
        }

        log::info!(
            "Collected {} initial files for cooking (seed files) in {:.2?}",
            seeds.len(),
            timer.elapsed()
        );
        seeds
    }

    //--

    /// Walks the reachability closure of one seed. The worklist is popped
    /// from the back, so the walk is depth-first in practice.
    #[profiling::function]
    fn process_single_seed_file(
        &self,
        seed_key: &ResourceKey,
        state: &mut CookRunState,
    ) {
        let timer = Instant::now();
        let mut cooking_queue = vec![PendingCookEntry::new(seed_key.clone())];
        let mut local_processed = 0u32;

        while let Some(top_entry) = cooking_queue.pop() {
            local_processed += 1;
            state.statistics.visited += 1;

            // Prevent this file from being recooked a second time this run
            if !state.all_seen_files.insert(top_entry.key.clone()) {
                continue;
            }

            // Check if we can cook this file at all
            let Some(cooked_class) = self.cooker.can_cook(&top_entry.key) else {
                log::warn!(
                    "Resource '{}' is not cookable and will be skipped. Why is it referenced though?",
                    top_entry.key
                );
                state
                    .log_data
                    .warn(Some(&top_entry.key), "Resource is not cookable, skipped");
                continue;
            };

            // Cooked file will be stored at a deterministic path
            let Some(cooked_file_path) =
                self.assemble_cooked_output_path(&top_entry.key, &cooked_class)
            else {
                log::warn!(
                    "Resource '{}' is not cookable (no valid cooked extension)",
                    top_entry.key
                );
                state
                    .log_data
                    .warn(Some(&top_entry.key), "No valid cooked extension, skipped");
                continue;
            };

            // The target file must exist to have any chance of skipping the
            // cook
            if cooked_file_path.exists() {
                match self.load_output_metadata(&cooked_file_path) {
                    Some(metadata) => {
                        if check_dependencies_up_to_date(
                            &*self.depot,
                            self.cooker.cooker_registry(),
                            &metadata,
                        ) {
                            // Skip this file but make sure the loading
                            // dependencies get their own up-to-date pass
                            self.queue_loading_dependencies(&cooked_file_path, &mut cooking_queue);
                            state.statistics.up_to_date += 1;
                            continue;
                        }
                    }
                    None => {
                        log::warn!(
                            "Failed to load metadata for output file '{}'. It might be corrupted, recooking.",
                            top_entry.key
                        );
                    }
                }
            }

            self.cook_file(
                &top_entry.key,
                cooked_class,
                &cooked_file_path,
                &mut cooking_queue,
                state,
            );

            if state.statistics.aborted {
                return;
            }
        }

        log::info!(
            "Processed {} source files for seed file '{}' in {:.2?}",
            local_processed,
            seed_key,
            timer.elapsed()
        );
    }

    fn load_output_metadata(
        &self,
        cooked_file_path: &std::path::Path,
    ) -> Option<crate::Metadata> {
        let mut file = std::fs::File::open(cooked_file_path).ok()?;
        storage::load_cooked_metadata(&mut file).ok().flatten()
    }

    /// `<outputRoot>/cooked/<relativeDirectory>/<fileName>.<cookedClassExtension>`
    fn assemble_cooked_output_path(
        &self,
        key: &ResourceKey,
        cooked_class: &ResourceClassName,
    ) -> Option<PathBuf> {
        let load_extension = self.cooker.type_registry().load_extension(cooked_class)?;

        let mut path = self.config.output_root.clone();
        path.push("cooked");
        for segment in kiln_base::depot_path::directory(key.path())
            .split('/')
            .filter(|s| !s.is_empty())
        {
            path.push(segment);
        }
        path.push(format!(
            "{}.{}",
            kiln_base::depot_path::file_stem(key.path()),
            load_extension
        ));
        Some(path)
    }

    /// Re-queues the loading dependencies recorded in an up-to-date output,
    /// extracted from the container header without recomputing anything.
    fn queue_loading_dependencies(
        &self,
        cooked_file_path: &std::path::Path,
        out_cooking_queue: &mut Vec<PendingCookEntry>,
    ) {
        let Ok(mut file) = std::fs::File::open(cooked_file_path) else {
            return;
        };

        match storage::extract_loading_dependencies(&mut file) {
            Ok(dependencies) => {
                if !dependencies.is_empty() {
                    log::info!(
                        "Loaded {} existing dependencies from '{}'",
                        dependencies.len(),
                        cooked_file_path.display()
                    );
                }
                for key in dependencies {
                    out_cooking_queue.push(PendingCookEntry::new(key));
                }
            }
            Err(e) => {
                log::warn!(
                    "Failed to extract dependencies from '{}': {}",
                    cooked_file_path.display(),
                    e
                );
            }
        }
    }

    /// Pushes resources referenced by a freshly cooked object graph that
    /// have not been scheduled yet.
    fn queue_object_dependencies(
        &self,
        cooked: &CookedResource,
        state: &mut CookRunState,
        out_cooking_queue: &mut Vec<PendingCookEntry>,
    ) {
        let referenced_resources = cooked.resource.referenced_resources();
        if referenced_resources.is_empty() {
            return;
        }

        log::info!(
            "Found {} referenced resources, adding them to cook list",
            referenced_resources.len()
        );

        for key in referenced_resources {
            if state.all_collected_files.insert(key.clone()) {
                log::info!("Added '{}' to cooking queue", key);
                out_cooking_queue.push(PendingCookEntry::new(key));
            }
        }
    }

    fn log_file_path(cooked_file_path: &std::path::Path) -> PathBuf {
        let mut log_path = cooked_file_path.to_path_buf().into_os_string();
        log_path.push(".log");
        PathBuf::from(log_path)
    }

    fn write_or_discard_log(
        &self,
        cooked_file_path: &std::path::Path,
        cook_key: &ResourceKey,
        succeeded: bool,
        state: &CookRunState,
    ) {
        if !self.config.capture_logs {
            return;
        }

        let log_path = Self::log_file_path(cooked_file_path);

        // Failed-cook logs are always retained for diagnosis
        if succeeded && !self.config.keep_all_logs {
            let _ = std::fs::remove_file(&log_path);
            return;
        }

        let text = state.log_data.render_events_for_key(cook_key);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&log_path, text) {
            log::warn!("Failed to write cook log '{}': {}", log_path.display(), e);
        }
    }

    fn cook_file(
        &self,
        key: &ResourceKey,
        cooked_class: ResourceClassName,
        cooked_file_path: &std::path::Path,
        out_cooking_queue: &mut Vec<PendingCookEntry>,
        state: &mut CookRunState,
    ) -> bool {
        // Do not cook files more than once; also promote the resource key to
        // its true class, ie ITexture:lena.png -> StaticTexture:lena.png
        let cook_key = ResourceKey::new(key.path(), cooked_class);
        if !state.all_cooked_files.insert(cook_key.clone()) {
            return true;
        }

        log::info!("Cooking file {}: {}", state.cook_file_index, key);
        state.cook_file_index += 1;
        state
            .log_data
            .info(Some(&cook_key), format!("Cooking '{}'", cook_key));

        let cook_result = {
            profiling::scope!("Cook resource");
            self.cooker.cook(&cook_key, &*self.loader)
        };

        match cook_result {
            Ok(cooked) => {
                self.write_or_discard_log(cooked_file_path, &cook_key, true, state);

                // Gather resources used by this resource
                self.queue_object_dependencies(&cooked, state, out_cooking_queue);

                let is_direct_copy = cooked
                    .metadata
                    .as_ref()
                    .map(|metadata| metadata.is_direct_copy())
                    .unwrap_or(true);
                if is_direct_copy {
                    state.statistics.copied += 1;
                } else {
                    state.statistics.cooked += 1;
                }

                self.save_thread
                    .schedule_save(cooked, cooked_file_path.to_path_buf());
                true
            }
            Err(e) => {
                log::error!("Failed to cook file '{}': {}", cook_key.path(), e);
                state
                    .log_data
                    .error(Some(&cook_key), format!("Cook failed: {}", e));
                self.write_or_discard_log(cooked_file_path, &cook_key, false, state);

                state.statistics.failed += 1;
                if state.statistics.failed > self.config.failure_abort_threshold {
                    // Something is really wrong
                    log::error!(
                        "More than {} files failed cooking, something must be VERY wrong. Stopping now.",
                        self.config.failure_abort_threshold
                    );
                    state.statistics.aborted = true;
                }
                false
            }
        }
    }
}
