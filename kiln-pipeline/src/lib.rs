mod pipeline_error;
pub use pipeline_error::*;

mod resource;
pub use resource::*;

mod type_registry;
pub use type_registry::{ResourceClassDef, TextLoaderFn, TypeRegistry, TypeRegistryBuilder};

pub mod depot;

mod progress;
pub use progress::ProgressTracker;

mod cook_context;
pub use cook_context::CookContext;

mod cooker_registry;
pub use cooker_registry::{
    CookableClass, CookerInfo, CookerRegistration, CookerRegistry, CookerRegistryBuilder,
    ResourceCooker,
};

mod cooker;
pub use cooker::{is_self_cooking_resource, Cooker};

mod up_to_date;
pub use up_to_date::check_dependencies_up_to_date;

pub mod storage;

mod save_thread;
pub use save_thread::SaveThread;

mod dependency_tracking;
pub use dependency_tracking::DependencyTracker;

mod log_events;
pub use log_events::*;

mod seed_file;
pub use seed_file::{
    register_seed_file_class, SeedFile, SeedFileEntry, SEED_FILE_CLASS, SEED_FILE_EXTENSION,
};

mod cook_jobs;
pub use cook_jobs::{
    CookJobs, CookJobsConfig, CookRunStatistics, DEFAULT_FAILURE_ABORT_THRESHOLD,
};

mod reload;
pub use reload::{LiveObjectDirectory, NoLiveObjects, ReloadObserver, ReloadingResourceLoader};

mod project;
pub use project::{DepotMount, KilnProjectConfiguration};

#[cfg(test)]
mod tests;

/// The registries a cooking run needs, built once from every registered
/// plugin and immutable afterwards.
pub struct CookerPluginRegistries {
    pub type_registry: TypeRegistry,
    pub cooker_registry: CookerRegistry,
}

pub struct CookerPluginSetupContext<'a> {
    pub type_registry: &'a mut TypeRegistryBuilder,
    pub cooker_registry: &'a mut CookerRegistryBuilder,
}

/// One unit of registration: an asset plugin declares its resource classes
/// and cooker implementations through the setup context.
pub trait CookerPlugin {
    fn setup(context: CookerPluginSetupContext);
}

pub struct CookerPluginRegistryBuilders {
    type_registry: TypeRegistryBuilder,
    cooker_registry: CookerRegistryBuilder,
}

impl CookerPluginRegistryBuilders {
    pub fn new() -> Self {
        let mut type_registry = TypeRegistryBuilder::default();

        // Built-in classes every project gets
        register_seed_file_class(&mut type_registry);

        CookerPluginRegistryBuilders {
            type_registry,
            cooker_registry: CookerRegistryBuilder::default(),
        }
    }

    pub fn register_plugin<T: CookerPlugin>(mut self) -> Self {
        T::setup(CookerPluginSetupContext {
            type_registry: &mut self.type_registry,
            cooker_registry: &mut self.cooker_registry,
        });
        self
    }

    pub fn finish(self) -> CookerPluginRegistries {
        let type_registry = self.type_registry.build();
        let cooker_registry = self.cooker_registry.build(&type_registry);

        CookerPluginRegistries {
            type_registry,
            cooker_registry,
        }
    }
}
