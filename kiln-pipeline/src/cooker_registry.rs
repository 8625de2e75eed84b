use crate::{CookContext, PipelineResult, ResourceClassName, ResourceKey, ResourcePtr, TypeRegistry};
use kiln_base::hashing::HashMap;
use std::sync::Arc;

/// Interface all cooker implementations must implement. A cooker is a black
/// box: it reads its inputs through the context (which records every touch as
/// a dependency) and returns the produced resource.
pub trait ResourceCooker: Send + Sync + 'static {
    fn cook(
        &self,
        context: &mut CookContext,
    ) -> PipelineResult<ResourcePtr>;
}

/// Capability descriptor attached to a cooker registration. Registration is
/// an explicit data table: everything the lookup needs is declared here, no
/// runtime type scanning.
pub struct CookerRegistration {
    pub name: String,
    pub version: u32,
    /// Raw source file extensions this cooker accepts. Empty means the cooker
    /// consumes another resource's cooked output instead of raw bytes.
    pub source_extensions: Vec<String>,
    /// For dependent cookers: the already-cooked classes consumed as input.
    pub source_classes: Vec<ResourceClassName>,
    pub target_classes: Vec<ResourceClassName>,
    pub cooker: Arc<dyn ResourceCooker>,
}

pub struct CookerInfo {
    pub name: String,
    pub version: u32,
    pub cooker: Arc<dyn ResourceCooker>,
}

/// One entry of the cookable-class table: how to produce `target_class` from
/// a file with the keying extension. A None cooker marks a self-cooking
/// entry (load the text form, no transformation).
///
/// Order: 0 = direct cooker consuming raw bytes, 1 = dependent cooker
/// consuming an already-cooked class, 2 = self-cooking pass-through.
#[derive(Clone)]
pub struct CookableClass {
    pub cooker: Option<Arc<CookerInfo>>,
    pub target_class: ResourceClassName,
    pub order: u8,
}

struct CookerRegistryInner {
    cookable_class_map: HashMap<String, Vec<CookableClass>>,
    self_cookable_classes: HashMap<String, ResourceClassName>,
    cooker_versions: HashMap<String, u32>,
    type_registry: TypeRegistry,
}

/// Built once at startup, immutable after construction, safe for concurrent
/// lookups without locking.
#[derive(Clone)]
pub struct CookerRegistry {
    inner: Arc<CookerRegistryInner>,
}

#[derive(Default)]
pub struct CookerRegistryBuilder {
    registrations: Vec<CookerRegistration>,
}

impl CookerRegistryBuilder {
    pub fn register_cooker(
        &mut self,
        registration: CookerRegistration,
    ) {
        self.registrations.push(registration);
    }

    pub fn build(
        self,
        type_registry: &TypeRegistry,
    ) -> CookerRegistry {
        let mut cookable_class_map = HashMap::<String, Vec<CookableClass>>::default();
        let mut cooker_versions = HashMap::default();

        // List of extensions usable to cook a given class, filled while
        // processing direct cookers and consumed by dependent cookers
        let mut class_source_extensions = HashMap::<ResourceClassName, Vec<String>>::default();

        let mut dependent_cookers = Vec::default();
        for registration in self.registrations {
            if registration.target_classes.is_empty() {
                log::warn!(
                    "Cooker '{}' has no output class specified, nothing will be cooked by it",
                    registration.name
                );
                continue;
            }

            if registration.source_extensions.is_empty() {
                if registration.source_classes.is_empty() {
                    log::warn!(
                        "Cooker '{}' has no source class specified, nothing will be cooked by it",
                        registration.name
                    );
                    continue;
                }

                log::trace!(
                    "Cooker '{}' is a dependent cooker, processing later",
                    registration.name
                );
                dependent_cookers.push(registration);
                continue;
            }

            if let Some(old_version) =
                cooker_versions.insert(registration.name.clone(), registration.version)
            {
                log::error!(
                    "Cooker '{}' registered more than once (versions {} and {})",
                    registration.name,
                    old_version,
                    registration.version
                );
            }

            let info = Arc::new(CookerInfo {
                name: registration.name.clone(),
                version: registration.version,
                cooker: registration.cooker.clone(),
            });

            for extension in &registration.source_extensions {
                let extension_table = cookable_class_map.entry(extension.clone()).or_default();

                for target_class in &registration.target_classes {
                    // The class is producible from this extension whether or
                    // not the entry below wins the conflict check
                    let extensions =
                        class_source_extensions.entry(target_class.clone()).or_default();
                    if !extensions.contains(extension) {
                        extensions.push(extension.clone());
                    }

                    // Keep the first-found entry when two cookers claim the
                    // same (extension, target class) pair
                    if let Some(existing) = extension_table
                        .iter()
                        .find(|entry| &entry.target_class == target_class)
                    {
                        log::error!(
                            "Cooking conflict, the '{}' is cookable from '{}' as well as '{}'",
                            target_class,
                            existing.cooker.as_ref().map(|c| c.name.as_str()).unwrap_or("<self>"),
                            registration.name
                        );
                        continue;
                    }

                    log::trace!(
                        "Found native cooking recipe to cook '{}' from extension '{}' using '{}'",
                        target_class,
                        extension,
                        registration.name
                    );
                    extension_table.push(CookableClass {
                        cooker: Some(info.clone()),
                        target_class: target_class.clone(),
                        order: 0,
                    });
                }
            }
        }

        // Cookers that consume already-cooked resources: resolve every
        // extension known to produce their source classes
        for registration in dependent_cookers {
            if let Some(old_version) =
                cooker_versions.insert(registration.name.clone(), registration.version)
            {
                log::error!(
                    "Cooker '{}' registered more than once (versions {} and {})",
                    registration.name,
                    old_version,
                    registration.version
                );
            }

            let info = Arc::new(CookerInfo {
                name: registration.name.clone(),
                version: registration.version,
                cooker: registration.cooker.clone(),
            });

            for source_class in &registration.source_classes {
                let mut source_extensions = class_source_extensions
                    .get(source_class)
                    .cloned()
                    .unwrap_or_default();

                // If the source class is loadable directly, its own extension
                // is usable as well
                if let Some(load_extension) = type_registry.load_extension(source_class) {
                    if !source_extensions.iter().any(|e| e == load_extension) {
                        source_extensions.push(load_extension.to_string());
                    }
                }

                for extension in &source_extensions {
                    let extension_table = cookable_class_map.entry(extension.clone()).or_default();

                    for target_class in &registration.target_classes {
                        if let Some(existing) = extension_table
                            .iter()
                            .find(|entry| &entry.target_class == target_class)
                        {
                            log::error!(
                                "Cooking conflict, the '{}' is cookable from '{}' as well as '{}'",
                                target_class,
                                existing
                                    .cooker
                                    .as_ref()
                                    .map(|c| c.name.as_str())
                                    .unwrap_or("<self>"),
                                registration.name
                            );
                            continue;
                        }

                        log::trace!(
                            "Found dependent cooking recipe to cook '{}' from extension '{}' using '{}'",
                            target_class,
                            extension,
                            registration.name
                        );
                        extension_table.push(CookableClass {
                            cooker: Some(info.clone()),
                            target_class: target_class.clone(),
                            order: 1,
                        });
                    }
                }
            }
        }

        // Text resources with a direct file extension can be loaded as text
        // and saved in binary format with no transformation logic. Keyed
        // purely by extension, self-cooking is class-preserving.
        let self_cookable_classes = type_registry.text_classes_by_extension();

        CookerRegistry {
            inner: Arc::new(CookerRegistryInner {
                cookable_class_map,
                self_cookable_classes,
                cooker_versions,
                type_registry: type_registry.clone(),
            }),
        }
    }
}

impl CookerRegistry {
    /// The currently registered version of a cooker, None if the cooker no
    /// longer exists. Drives the up-to-date check.
    pub fn cooker_version(
        &self,
        cooker_name: &str,
    ) -> Option<u32> {
        self.inner.cooker_versions.get(cooker_name).copied()
    }

    fn best_entry_in_table<'a>(
        &self,
        table: &'a [CookableClass],
        requested_class: &ResourceClassName,
        exact: bool,
    ) -> Option<&'a CookableClass> {
        let mut best: Option<&'a CookableClass> = None;
        for entry in table {
            let matches = if exact {
                &entry.target_class == requested_class
            } else {
                self.inner
                    .type_registry
                    .is_compatible(&entry.target_class, requested_class)
            };
            if !matches {
                continue;
            }

            best = match best {
                None => Some(entry),
                Some(current) => {
                    if entry.order < current.order {
                        Some(entry)
                    } else if entry.order == current.order
                        && self.inner.type_registry.derivation_depth(&entry.target_class)
                            > self
                                .inner
                                .type_registry
                                .derivation_depth(&current.target_class)
                    {
                        // Most derived class wins among equal-order entries,
                        // keeping relaxed lookups independent of registration
                        // order
                        Some(entry)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        best
    }

    /// Finds the best recipe to cook the given key. Tries the path's
    /// extension with an exact target-class match, relaxes to compatible
    /// subclasses, retries under the "*" wildcard extension, then falls back
    /// to the self-cooking table. Returns None if the key is simply not
    /// cookable.
    pub fn find_best_cooker(
        &self,
        key: &ResourceKey,
    ) -> Option<CookableClass> {
        let path_extension = kiln_base::depot_path::extension(key.path())?;

        let extension_table = self
            .inner
            .cookable_class_map
            .get(path_extension)
            .map(|v| v.as_slice())
            .unwrap_or(&[]);
        let wildcard_table = self
            .inner
            .cookable_class_map
            .get("*")
            .map(|v| v.as_slice())
            .unwrap_or(&[]);

        // Exact target class match first; if there is none, relax the check
        // a little bit so a compatible subclass entry can satisfy an
        // abstract request (cook a StaticTexture when an ITexture is asked
        // for). The wildcard extension is only consulted when the path's own
        // extension resolved nothing.
        let mut best = self.best_entry_in_table(extension_table, key.class(), true);
        if best.is_none() {
            best = self.best_entry_in_table(extension_table, key.class(), false);
        }
        if best.is_none() {
            best = self.best_entry_in_table(wildcard_table, key.class(), true);
        }
        if best.is_none() {
            best = self.best_entry_in_table(wildcard_table, key.class(), false);
        }

        if let Some(best) = best {
            log::trace!(
                "Best cooker for '{}' to '{}' found to be '{}'",
                path_extension,
                key.class(),
                best.cooker.as_ref().map(|c| c.name.as_str()).unwrap_or("<self>")
            );
            return Some(best.clone());
        }

        // Can we self-cook?
        if let Some(class) = self.inner.self_cookable_classes.get(path_extension) {
            if self.inner.type_registry.is_compatible(class, key.class()) {
                return Some(CookableClass {
                    cooker: None,
                    target_class: class.clone(),
                    order: 2,
                });
            }
        }

        None
    }
}
