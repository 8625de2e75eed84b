use crate::{
    PipelineResult, Resource, ResourceClassDef, ResourceClassName, ResourceKey, ResourcePtr,
    TypeRegistryBuilder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const SEED_FILE_CLASS: &str = "SeedFile";
pub const SEED_FILE_EXTENSION: &str = "seeds";

/// One resource a seed file marks as required: a path relative to the seed
/// file itself plus the class it should be cooked as.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeedFileEntry {
    pub relative_path: String,
    pub resource_class: String,
}

/// A resource listing other resources that must be included in a cook. Seed
/// files are the reachability roots of a cooking run. They are text
/// resources (json on disk) and self-cook into binary form.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SeedFile {
    pub files: Vec<SeedFileEntry>,
}

impl SeedFile {
    pub fn from_json_bytes(data: &[u8]) -> PipelineResult<SeedFile> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn to_json_string(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Keys of the listed resources, resolved against the seed file's own
    /// depot path. Unresolvable entries are reported through `on_invalid`.
    pub fn resolved_keys(
        &self,
        seed_file_path: &str,
        on_invalid: &mut dyn FnMut(&SeedFileEntry, &str),
    ) -> Vec<ResourceKey> {
        let mut keys = Vec::with_capacity(self.files.len());
        for entry in &self.files {
            if entry.resource_class.is_empty() {
                on_invalid(entry, "missing resource class");
                continue;
            }

            match kiln_base::depot_path::apply_relative_path(seed_file_path, &entry.relative_path)
            {
                Some(depot_path) => keys.push(ResourceKey::new(
                    depot_path,
                    ResourceClassName::from(entry.resource_class.as_str()),
                )),
                None => on_invalid(entry, "relative path escapes the depot"),
            }
        }
        keys
    }
}

impl Resource for SeedFile {
    fn class_name(&self) -> ResourceClassName {
        ResourceClassName::from(SEED_FILE_CLASS)
    }

    fn serialize_payload(&self) -> PipelineResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Registers the seed file class: a text resource with its own extension,
/// loadable directly and therefore self-cooking.
pub fn register_seed_file_class(builder: &mut TypeRegistryBuilder) {
    builder.register_class(
        ResourceClassDef::new(SEED_FILE_CLASS)
            .with_load_extension(SEED_FILE_EXTENSION)
            .with_text_loader(Arc::new(|data| {
                let seed_file = SeedFile::from_json_bytes(data)?;
                Ok(Arc::new(seed_file) as ResourcePtr)
            })),
    );
}
