use crate::depot::{
    directory_listing_path, enumerate_depot_files, split_extension_filter, Depot, DepotFileInfo,
    MountPoint,
};
use crate::{
    CookedResource, PipelineError, PipelineResult, ProgressTracker, ResourceKey, ResourceLoader,
    SourceDependency, TypeRegistry,
};
use kiln_base::hashing::HashMap;
use std::io::Read;

/// The sandboxed façade a cooker implementation uses to read source bytes,
/// discover files, resolve loosely-specified paths and report progress.
/// Scoped to a single cook of a single resource; every file the cooker
/// touches through it is recorded as a dependency, so a cooker cannot
/// accidentally consume an untracked input.
pub struct CookContext<'a> {
    depot: &'a dyn Depot,
    loader: Option<&'a dyn ResourceLoader>,
    type_registry: &'a TypeRegistry,
    resource_path: String,
    mount_point: MountPoint,
    final_cook: bool,
    progress: Option<&'a dyn ProgressTracker>,
    dependencies: Vec<SourceDependency>,
    // Idempotence cache: path -> exists, so repeated touches of the same
    // path never re-query the depot and never duplicate dependencies
    touched: HashMap<String, bool>,
}

impl<'a> CookContext<'a> {
    pub fn new(
        depot: &'a dyn Depot,
        loader: Option<&'a dyn ResourceLoader>,
        type_registry: &'a TypeRegistry,
        resource_path: String,
        mount_point: MountPoint,
        final_cook: bool,
        progress: Option<&'a dyn ProgressTracker>,
    ) -> Self {
        CookContext {
            depot,
            loader,
            type_registry,
            resource_path,
            mount_point,
            final_cook,
            progress,
            dependencies: Vec::default(),
            touched: HashMap::default(),
        }
    }

    /// Depot path of the resource being cooked.
    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    pub fn mount_point(&self) -> &MountPoint {
        &self.mount_point
    }

    /// True when this is a final/shipping cook.
    pub fn final_cook(&self) -> bool {
        self.final_cook
    }

    pub fn check_cancellation(&self) -> bool {
        self.progress
            .map(|progress| progress.check_cancellation())
            .unwrap_or(false)
    }

    pub fn report_progress(
        &self,
        current_count: u64,
        total_count: u64,
        text: &str,
    ) {
        if let Some(progress) = self.progress {
            progress.report_progress(current_count, total_count, text);
        }
    }

    /// Records this path's existence and timestamp as a dependency and
    /// returns whether the file exists. Idempotent within one cook.
    pub fn touch_file(
        &mut self,
        path: &str,
    ) -> bool {
        if let Some(&exists) = self.touched.get(path) {
            return exists;
        }

        let info = self.depot.query_file_info(path);
        let exists = info.is_some();
        let info = info.unwrap_or_default();

        self.dependencies
            .push(SourceDependency::new(path, info.timestamp, info.size));
        self.touched.insert(path.to_string(), exists);

        if exists {
            log::info!(
                "Discovered dependency for '{}' on '{}'",
                self.resource_path,
                path
            );
        }

        exists
    }

    /// Like `touch_file`, but also records the file's content hash so a
    /// later up-to-date check can give the file a second chance when only
    /// its timestamp changed (revision-control checkouts and similar).
    pub fn touch_file_with_content_hash(
        &mut self,
        path: &str,
    ) -> bool {
        let exists = self.touch_file(path);
        if exists {
            if let Some(hash) = self.depot.query_file_content_hash(path) {
                for dep in self.dependencies.iter_mut().rev() {
                    if dep.source_path == path {
                        dep.content_hash = hash;
                        break;
                    }
                }
            }
        }
        exists
    }

    /// Raw file state query. Records the dependency unless `make_dependency`
    /// is false.
    pub fn query_file_info(
        &mut self,
        path: &str,
        make_dependency: bool,
    ) -> Option<DepotFileInfo> {
        let info = self.depot.query_file_info(path);
        if make_dependency {
            self.touch_file(path);
        }
        info
    }

    pub fn create_reader(
        &mut self,
        path: &str,
    ) -> PipelineResult<Box<dyn Read + Send>> {
        self.touch_file(path);
        self.depot
            .create_file_reader(path)
            .ok_or_else(|| PipelineError::ResourceNotFound(path.to_string()))
    }

    pub fn load_to_buffer(
        &mut self,
        path: &str,
    ) -> PipelineResult<Vec<u8>> {
        let mut reader = self.create_reader(path)?;
        let mut buffer = Vec::default();
        reader.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    pub fn load_to_string(
        &mut self,
        path: &str,
    ) -> PipelineResult<String> {
        let buffer = self.load_to_buffer(path)?;
        String::from_utf8(buffer)
            .map_err(|_| PipelineError::StringError(format!("File '{}' is not valid UTF-8", path)))
    }

    /// Resolves a relative path against this resource's own path (or a given
    /// context path), or against the mount point of the context path for
    /// non-local references.
    pub fn query_resolved_path(
        &self,
        relative: &str,
        context_path: Option<&str>,
        is_local: bool,
    ) -> Option<String> {
        if is_local {
            let context = context_path.unwrap_or(&self.resource_path);
            kiln_base::depot_path::apply_relative_path(context, relative)
        } else {
            let context = context_path.unwrap_or(&self.resource_path);
            let mount_point = self.depot.query_file_mount_point(context)?;
            Some(mount_point.expand_from_relative(relative))
        }
    }

    /// Enumerates files in a directory relative to this resource's location.
    /// The enumeration itself becomes a single synthetic dependency carrying
    /// the newest timestamp and a hash of the sorted matching names, so
    /// adding or removing a matching file invalidates the cook even though
    /// no single file's content changed.
    pub fn discover_resolved_paths(
        &mut self,
        relative_dir: &str,
        recurse: bool,
        extension_filter: &str,
    ) -> PipelineResult<Vec<String>> {
        if !relative_dir.ends_with('/') {
            Err(format!(
                "Directory path '{}' must end with a slash",
                relative_dir
            ))?;
        }

        let root_dir =
            kiln_base::depot_path::apply_relative_path(&self.resource_path, relative_dir)
                .ok_or_else(|| {
                    format!(
                        "Directory path '{}' escapes the depot relative to '{}'",
                        relative_dir, self.resource_path
                    )
                })?;

        let extensions = split_extension_filter(extension_filter);
        let listing = enumerate_depot_files(self.depot, &root_dir, recurse, &extensions);

        self.dependencies.push(SourceDependency {
            source_path: directory_listing_path(&root_dir, recurse, extension_filter),
            timestamp: listing.newest_timestamp,
            size: 0,
            content_hash: listing.names_hash,
            directory_listing: true,
        });

        Ok(listing.files)
    }

    /// Heuristic nearest-file resolver for loosely-specified cross
    /// references (legacy asset formats with ambiguous relative paths).
    /// Tries combinations of trimming directories off the context path and
    /// sliding the input path's leading components, up to `max_scan_depth`
    /// combinations in each dimension. Every candidate probed becomes a
    /// dependency whether or not it exists, so a later cook detects a
    /// candidate starting or stopping to exist.
    pub fn find_file(
        &mut self,
        context_path: &str,
        input_path: &str,
        max_scan_depth: u32,
    ) -> Option<String> {
        let input_parts: Vec<&str> = input_path
            .split(|c| c == '\\' || c == '/')
            .filter(|s| !s.is_empty())
            .collect();
        if input_parts.is_empty() {
            return None;
        }

        let mut reference_parts: Vec<&str> = context_path
            .split(|c| c == '\\' || c == '/')
            .filter(|s| !s.is_empty())
            .collect();
        if reference_parts.is_empty() {
            return None;
        }

        // Remove the file name of the reference path
        reference_parts.pop();

        for _ in 0..max_scan_depth {
            let inner_search_depth = (max_scan_depth as usize).min(input_parts.len());
            for j in 0..inner_search_depth {
                let first_input_part = input_parts.len() - j - 1;
                let candidate: Vec<&str> = reference_parts
                    .iter()
                    .chain(&input_parts[first_input_part..])
                    .copied()
                    .collect();
                let candidate = candidate.join("/");

                if self.touch_file(&candidate) {
                    return Some(candidate);
                }
            }

            // Nothing found, retry with fewer base directories
            if reference_parts.pop().is_none() {
                break;
            }
        }

        None
    }

    /// Lets a cooker depend on another cooked resource rather than a raw
    /// file. Every source dependency the other resource's metadata already
    /// recorded is folded into this cook's dependency list, so dependency
    /// chains are flattened and the up-to-date check never recurses through
    /// resource graphs.
    pub fn load_dependency_resource(
        &mut self,
        key: &ResourceKey,
    ) -> PipelineResult<CookedResource> {
        log::info!("Discovered dependency on another cooked resource '{}'", key);

        if !self.type_registry.is_registered(key.class()) {
            Err(format!("Dependency on a non-resource object '{}'", key))?;
        }

        let loader = self
            .loader
            .ok_or_else(|| format!("No dependency loader available to load '{}'", key))?;

        let loaded = loader.load_resource(key)?;

        if let Some(metadata) = &loaded.metadata {
            log::info!(
                "Discovered {} dependencie(s) in the dependant resource '{}'",
                metadata.source_dependencies.len(),
                key
            );

            for dep in metadata.source_dependencies.clone() {
                if dep.directory_listing {
                    // Listing dependencies are copied verbatim, touching the
                    // synthetic path would record garbage
                    if !self
                        .dependencies
                        .iter()
                        .any(|existing| existing.source_path == dep.source_path)
                    {
                        self.dependencies.push(dep);
                    }
                } else {
                    self.touch_file(&dep.source_path);
                }
            }
        }

        Ok(loaded)
    }

    /// The accumulated touch list, in discovery order.
    pub fn into_dependencies(self) -> Vec<SourceDependency> {
        self.dependencies
    }
}
