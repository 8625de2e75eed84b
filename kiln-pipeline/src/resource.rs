use crate::PipelineResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name of a registered resource class. Cheap to clone, used as a map key
/// throughout the pipeline.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceClassName(String);

impl ResourceClassName {
    pub fn new<T: Into<String>>(name: T) -> Self {
        ResourceClassName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceClassName {
    fn fmt(
        &self,
        fmt: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        self.0.fmt(fmt)
    }
}

impl std::fmt::Debug for ResourceClassName {
    fn fmt(
        &self,
        fmt: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        self.0.fmt(fmt)
    }
}

impl From<&str> for ResourceClassName {
    fn from(name: &str) -> Self {
        ResourceClassName(name.to_string())
    }
}

/// Identity of a resource: a depot path plus the class it is requested as.
/// The same path requested as two different classes is two distinct keys
/// (a raw .png can be requested as "ITexture" and later promoted to
/// "StaticTexture").
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    path: String,
    class: ResourceClassName,
}

impl ResourceKey {
    pub fn new<P: Into<String>>(
        path: P,
        class: ResourceClassName,
    ) -> Self {
        ResourceKey {
            path: path.into(),
            class,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn class(&self) -> &ResourceClassName {
        &self.class
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(
        &self,
        fmt: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        write!(fmt, "{}:{}", self.class, self.path)
    }
}

impl std::fmt::Debug for ResourceKey {
    fn fmt(
        &self,
        fmt: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        write!(fmt, "{}:{}", self.class, self.path)
    }
}

/// One source file (or directory listing) a cook consumed. A zero size or
/// content hash means "not recorded". Directory-listing dependencies store the
/// newest timestamp of the enumerated files and a hash of the sorted file
/// names in `content_hash`, so adding or removing a matching file invalidates
/// the cook even when no individual file changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceDependency {
    pub source_path: String,
    pub timestamp: u64,
    pub size: u64,
    pub content_hash: u64,
    pub directory_listing: bool,
}

impl SourceDependency {
    pub fn new<P: Into<String>>(
        source_path: P,
        timestamp: u64,
        size: u64,
    ) -> Self {
        SourceDependency {
            source_path: source_path.into(),
            timestamp,
            size,
            content_hash: 0,
            directory_listing: false,
        }
    }
}

/// Persisted record of what a cook consumed and which cooker produced it.
/// Created fresh on every successful cook, loaded back from the cooked file
/// header to decide whether a recook is needed, never mutated. An empty
/// cooker class name marks a direct copy (self-cooked resource) rather than
/// the output of a cooker implementation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Metadata {
    pub cooker_class: String,
    pub cooker_version: u32,
    pub resource_class: ResourceClassName,
    pub resource_data_version: u32,
    pub source_dependencies: Vec<SourceDependency>,
}

impl Metadata {
    pub fn is_direct_copy(&self) -> bool {
        self.cooker_class.is_empty()
    }
}

/// A runtime resource produced by cooking or direct loading.
pub trait Resource: Send + Sync + 'static {
    fn class_name(&self) -> ResourceClassName;

    /// Serializes the resource payload into the binary form stored in the
    /// cooked file.
    fn serialize_payload(&self) -> PipelineResult<Vec<u8>>;

    /// Keys of other cooked resources this resource references. The cooking
    /// walker uses this to discover additional work.
    fn referenced_resources(&self) -> Vec<ResourceKey> {
        Vec::default()
    }

    /// Called on the old resource instance when a new version replaces it
    /// during hot reload.
    fn apply_reload(
        &self,
        _new_version: &ResourcePtr,
    ) {
    }

    fn as_any(&self) -> &dyn std::any::Any;
}

pub type ResourcePtr = Arc<dyn Resource>;

/// A resource handle together with the metadata stamped when it was cooked.
/// Metadata is None when the resource did not go through a cook at all.
#[derive(Clone)]
pub struct CookedResource {
    pub resource: ResourcePtr,
    pub metadata: Option<Arc<Metadata>>,
}

/// The loading surface consumed by the cooker for dependency resources and
/// for the self-cook fallback.
pub trait ResourceLoader: Send + Sync {
    fn load_resource(
        &self,
        key: &ResourceKey,
    ) -> PipelineResult<CookedResource>;
}
