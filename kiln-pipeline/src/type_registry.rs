use crate::{PipelineResult, ResourceClassName, ResourcePtr};
use kiln_base::hashing::{HashMap, HashSet};
use std::sync::Arc;

/// Loads a text resource from its source bytes. Presence of a text loader on
/// a class marks it as a text resource, eligible for self-cooking (load the
/// text form, re-serialize as binary, no transformation logic).
pub type TextLoaderFn = Arc<dyn Fn(&[u8]) -> PipelineResult<ResourcePtr> + Send + Sync>;

/// Explicit registration of a resource class. This replaces runtime type
/// reflection: everything the pipeline needs to know about a class is
/// declared here.
pub struct ResourceClassDef {
    pub name: ResourceClassName,
    pub parent: Option<ResourceClassName>,
    /// The extension a file of this class loads from directly (and the
    /// extension cooked outputs of this class are written with).
    pub load_extension: Option<String>,
    pub data_version: u32,
    pub text_loader: Option<TextLoaderFn>,
}

impl ResourceClassDef {
    pub fn new<T: Into<ResourceClassName>>(name: T) -> Self {
        ResourceClassDef {
            name: name.into(),
            parent: None,
            load_extension: None,
            data_version: 1,
            text_loader: None,
        }
    }

    pub fn with_parent<T: Into<ResourceClassName>>(
        mut self,
        parent: T,
    ) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_load_extension<T: Into<String>>(
        mut self,
        extension: T,
    ) -> Self {
        self.load_extension = Some(extension.into());
        self
    }

    pub fn with_data_version(
        mut self,
        version: u32,
    ) -> Self {
        self.data_version = version;
        self
    }

    pub fn with_text_loader(
        mut self,
        loader: TextLoaderFn,
    ) -> Self {
        self.text_loader = Some(loader);
        self
    }
}

struct ResourceClassInfo {
    def: ResourceClassDef,
    // The class itself plus every parent up the chain
    ancestors: HashSet<ResourceClassName>,
    derivation_depth: u32,
}

struct TypeRegistryInner {
    classes: HashMap<ResourceClassName, ResourceClassInfo>,
}

/// Immutable after build, safe to share and query concurrently without locks.
#[derive(Clone)]
pub struct TypeRegistry {
    inner: Arc<TypeRegistryInner>,
}

#[derive(Default)]
pub struct TypeRegistryBuilder {
    classes: Vec<ResourceClassDef>,
}

impl TypeRegistryBuilder {
    pub fn register_class(
        &mut self,
        def: ResourceClassDef,
    ) {
        self.classes.push(def);
    }

    pub fn build(self) -> TypeRegistry {
        let mut parents = HashMap::default();
        for def in &self.classes {
            if parents.insert(def.name.clone(), def.parent.clone()).is_some() {
                log::error!(
                    "Resource class '{}' registered more than once, keeping the first registration",
                    def.name
                );
            }
        }

        let mut classes = HashMap::default();
        for def in self.classes {
            if classes.contains_key(&def.name) {
                continue;
            }

            // Walk the parent chain to collect the ancestor set once, so
            // compatibility checks are set lookups at cook time
            let mut ancestors = HashSet::default();
            let mut derivation_depth = 0;
            ancestors.insert(def.name.clone());

            let mut current = def.parent.clone();
            while let Some(parent) = current {
                if !ancestors.insert(parent.clone()) {
                    log::error!(
                        "Resource class '{}' has a cyclic parent chain at '{}'",
                        def.name,
                        parent
                    );
                    break;
                }
                derivation_depth += 1;

                current = match parents.get(&parent) {
                    Some(grandparent) => grandparent.clone(),
                    None => {
                        log::error!(
                            "Resource class '{}' has unregistered parent '{}'",
                            def.name,
                            parent
                        );
                        None
                    }
                };
            }

            classes.insert(
                def.name.clone(),
                ResourceClassInfo {
                    def,
                    ancestors,
                    derivation_depth,
                },
            );
        }

        TypeRegistry {
            inner: Arc::new(TypeRegistryInner { classes }),
        }
    }
}

impl TypeRegistry {
    pub fn is_registered(
        &self,
        name: &ResourceClassName,
    ) -> bool {
        self.inner.classes.contains_key(name)
    }

    /// True if `concrete` is `requested` or derives from it. This is the
    /// check that lets a request for an abstract "ITexture" be satisfied by
    /// a "StaticTexture" entry.
    pub fn is_compatible(
        &self,
        concrete: &ResourceClassName,
        requested: &ResourceClassName,
    ) -> bool {
        self.inner
            .classes
            .get(concrete)
            .map(|info| info.ancestors.contains(requested))
            .unwrap_or(false)
    }

    /// How far `name` is from its root class. Used to break ties in favor of
    /// the most derived class.
    pub fn derivation_depth(
        &self,
        name: &ResourceClassName,
    ) -> u32 {
        self.inner
            .classes
            .get(name)
            .map(|info| info.derivation_depth)
            .unwrap_or(0)
    }

    pub fn load_extension(
        &self,
        name: &ResourceClassName,
    ) -> Option<&str> {
        self.inner
            .classes
            .get(name)?
            .def
            .load_extension
            .as_deref()
    }

    pub fn data_version(
        &self,
        name: &ResourceClassName,
    ) -> Option<u32> {
        self.inner.classes.get(name).map(|info| info.def.data_version)
    }

    pub fn text_loader(
        &self,
        name: &ResourceClassName,
    ) -> Option<TextLoaderFn> {
        self.inner.classes.get(name)?.def.text_loader.clone()
    }

    /// Every text resource class that declared a load extension, keyed by
    /// that extension. These are the self-cookable classes.
    pub fn text_classes_by_extension(&self) -> HashMap<String, ResourceClassName> {
        let mut result = HashMap::default();
        for (name, info) in &self.inner.classes {
            if info.def.text_loader.is_none() {
                continue;
            }

            if let Some(extension) = &info.def.load_extension {
                if let Some(existing) = result.insert(extension.clone(), name.clone()) {
                    log::error!(
                        "Text resource classes '{}' and '{}' both claim extension '{}'",
                        existing,
                        name,
                        extension
                    );
                }
            } else {
                log::warn!(
                    "Text resource class '{}' has no file extension specified and will not be \
                     cookable to engine format",
                    name
                );
            }
        }
        result
    }
}
