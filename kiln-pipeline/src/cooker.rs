use crate::cooker_registry::{CookableClass, CookerInfo, CookerRegistry};
use crate::depot::{Depot, MountPoint};
use crate::{
    CookContext, CookedResource, Metadata, PipelineError, PipelineResult, ProgressTracker,
    ResourceClassName, ResourceKey, ResourceLoader, TypeRegistry,
};
use std::sync::Arc;

/// True when the key's path extension equals its class's native load
/// extension: the file can be loaded directly, no cooking needed.
pub fn is_self_cooking_resource(
    type_registry: &TypeRegistry,
    key: &ResourceKey,
) -> bool {
    let load_extension = type_registry.load_extension(key.class());
    let file_extension = kiln_base::depot_path::extension(key.path());
    match (load_extension, file_extension) {
        (Some(load), Some(file)) => load == file,
        _ => false,
    }
}

/// Cooks a single resource: resolves the best cooker implementation for the
/// key, runs it against a fresh context, and stamps the produced resource
/// with the metadata the up-to-date check needs later.
pub struct Cooker {
    depot: Arc<dyn Depot>,
    type_registry: TypeRegistry,
    cooker_registry: CookerRegistry,
    final_cook: bool,
    progress: Option<Arc<dyn ProgressTracker>>,
}

impl Cooker {
    pub fn new(
        depot: Arc<dyn Depot>,
        type_registry: TypeRegistry,
        cooker_registry: CookerRegistry,
        final_cook: bool,
        progress: Option<Arc<dyn ProgressTracker>>,
    ) -> Self {
        Cooker {
            depot,
            type_registry,
            cooker_registry,
            final_cook,
            progress,
        }
    }

    pub fn depot(&self) -> &Arc<dyn Depot> {
        &self.depot
    }

    pub fn type_registry(&self) -> &TypeRegistry {
        &self.type_registry
    }

    pub fn cooker_registry(&self) -> &CookerRegistry {
        &self.cooker_registry
    }

    /// Pure query: can this key be cooked, and what class would the output
    /// be? No side effects.
    pub fn can_cook(
        &self,
        key: &ResourceKey,
    ) -> Option<ResourceClassName> {
        self.depot.query_file_mount_point(key.path())?;
        self.cooker_registry
            .find_best_cooker(key)
            .map(|recipe| recipe.target_class)
    }

    /// Performs one cook. Fails loudly on orphan paths (not under any known
    /// mount). If a cooker implementation matched, it runs against a fresh
    /// context; otherwise a self-cooking resource is loaded directly through
    /// the dependency loader and returned as-is, with no metadata stamped.
    #[profiling::function]
    pub fn cook(
        &self,
        key: &ResourceKey,
        loader: &dyn ResourceLoader,
    ) -> PipelineResult<CookedResource> {
        let Some(mount_point) = self.depot.query_file_mount_point(key.path()) else {
            return Err(PipelineError::StringError(format!(
                "No mount point found for resource '{}', is the path inside the depot?",
                key
            )));
        };

        if let Some(recipe) = self.cooker_registry.find_best_cooker(key) {
            if let Some(cooker_info) = recipe.cooker.clone() {
                return self.cook_using_cooker(key, mount_point, &recipe, &cooker_info, loader);
            }
        }

        if is_self_cooking_resource(&self.type_registry, key) {
            return loader.load_resource(key);
        }

        Err(PipelineError::NotCookable(format!(
            "No cooker found for resource '{}'",
            key
        )))
    }

    fn cook_using_cooker(
        &self,
        key: &ResourceKey,
        mount_point: MountPoint,
        recipe: &CookableClass,
        cooker_info: &CookerInfo,
        loader: &dyn ResourceLoader,
    ) -> PipelineResult<CookedResource> {
        debug_assert!(self
            .type_registry
            .is_compatible(&recipe.target_class, key.class()));

        let mut context = CookContext::new(
            &*self.depot,
            Some(loader),
            &self.type_registry,
            key.path().to_string(),
            mount_point,
            self.final_cook,
            self.progress.as_deref(),
        );

        let resource = cooker_info.cooker.cook(&mut context)?;
        let resource_class = resource.class_name();

        // The single place where "what did this cook consume" becomes durable
        let metadata = Metadata {
            source_dependencies: context.into_dependencies(),
            cooker_class: cooker_info.name.clone(),
            cooker_version: cooker_info.version,
            resource_data_version: self
                .type_registry
                .data_version(&resource_class)
                .unwrap_or(0),
            resource_class,
        };

        Ok(CookedResource {
            resource,
            metadata: Some(Arc::new(metadata)),
        })
    }
}
