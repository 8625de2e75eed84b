use crate::{CookedResource, Metadata, PipelineResult, ResourceKey};
use kiln_base::block_file::{BlockFileReader, BlockFileWriter};
use std::io::{Read, Seek, Write};

// Cooked file container layout:
//   block 0: bincode Option<Metadata>
//   block 1: bincode Vec<ResourceKey> (loading dependencies, references to
//            other cooked resources)
//   block 2: resource payload
// Blocks 0 and 1 can each be read without touching the payload, which keeps
// the up-to-date probe cheap for large cooked resources.

const COOKED_FILE_TAG: [u8; 4] = *b"KLCF";
const COOKED_FILE_VERSION: u32 = 1;

#[profiling::function]
pub fn save_cooked_resource<W: Write>(
    writer: &mut W,
    cooked: &CookedResource,
) -> PipelineResult<()> {
    let metadata_block = bincode::serialize(&cooked.metadata.as_deref())?;
    let loading_dependencies = cooked.resource.referenced_resources();
    let dependency_block = bincode::serialize(&loading_dependencies)?;
    let payload_block = cooked.resource.serialize_payload()?;

    let mut block_writer = BlockFileWriter::new(COOKED_FILE_TAG, COOKED_FILE_VERSION);
    block_writer.add_block(&metadata_block);
    block_writer.add_block(&dependency_block);
    block_writer.add_block(&payload_block);
    block_writer.write(writer)?;
    Ok(())
}

fn read_container<R: Read + Seek>(reader: &mut R) -> PipelineResult<BlockFileReader> {
    let block_reader = BlockFileReader::read_header(reader)?;
    if block_reader.file_tag_as_u8() != COOKED_FILE_TAG {
        Err("Not a cooked resource file")?;
    }
    if block_reader.version() != COOKED_FILE_VERSION {
        Err(format!(
            "Unsupported cooked file version {}",
            block_reader.version()
        ))?;
    }
    if block_reader.block_count() < 3 {
        Err("Cooked resource file is missing blocks")?;
    }
    Ok(block_reader)
}

/// Selective load of just the Metadata record, without deserializing the
/// payload.
#[profiling::function]
pub fn load_cooked_metadata<R: Read + Seek>(reader: &mut R) -> PipelineResult<Option<Metadata>> {
    let block_reader = read_container(reader)?;
    let block = block_reader.read_block(reader, 0)?;
    Ok(bincode::deserialize(&block)?)
}

/// The cooked resource's own loading-time dependency list (references to
/// other cooked resources), extracted from the container header.
#[profiling::function]
pub fn extract_loading_dependencies<R: Read + Seek>(
    reader: &mut R
) -> PipelineResult<Vec<ResourceKey>> {
    let block_reader = read_container(reader)?;
    let block = block_reader.read_block(reader, 1)?;
    Ok(bincode::deserialize(&block)?)
}

pub fn load_cooked_payload<R: Read + Seek>(reader: &mut R) -> PipelineResult<Vec<u8>> {
    let block_reader = read_container(reader)?;
    block_reader.read_block(reader, 2).map_err(Into::into)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Resource, ResourceClassName, ResourcePtr, SourceDependency};
    use std::io::Cursor;
    use std::sync::Arc;

    struct FakeTexture {
        pixels: Vec<u8>,
        references: Vec<ResourceKey>,
    }

    impl Resource for FakeTexture {
        fn class_name(&self) -> ResourceClassName {
            ResourceClassName::from("StaticTexture")
        }

        fn serialize_payload(&self) -> PipelineResult<Vec<u8>> {
            Ok(self.pixels.clone())
        }

        fn referenced_resources(&self) -> Vec<ResourceKey> {
            self.references.clone()
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn cooked_fixture() -> CookedResource {
        let resource: ResourcePtr = Arc::new(FakeTexture {
            pixels: vec![1, 2, 3, 4, 5],
            references: vec![ResourceKey::new(
                "textures/detail.png",
                ResourceClassName::from("StaticTexture"),
            )],
        });

        CookedResource {
            resource,
            metadata: Some(Arc::new(Metadata {
                cooker_class: "TextureCooker".to_string(),
                cooker_version: 3,
                resource_class: ResourceClassName::from("StaticTexture"),
                resource_data_version: 1,
                source_dependencies: vec![SourceDependency::new("textures/wall.png", 42, 100)],
            })),
        }
    }

    #[test]
    fn metadata_round_trips_without_the_payload() {
        let mut bytes = Vec::default();
        save_cooked_resource(&mut bytes, &cooked_fixture()).unwrap();

        let mut cursor = Cursor::new(&bytes);
        let metadata = load_cooked_metadata(&mut cursor).unwrap().unwrap();
        assert_eq!(metadata.cooker_class, "TextureCooker");
        assert_eq!(metadata.cooker_version, 3);
        assert_eq!(metadata.source_dependencies.len(), 1);
        assert_eq!(metadata.source_dependencies[0].source_path, "textures/wall.png");
    }

    #[test]
    fn loading_dependencies_come_from_the_header() {
        let mut bytes = Vec::default();
        save_cooked_resource(&mut bytes, &cooked_fixture()).unwrap();

        let mut cursor = Cursor::new(&bytes);
        let dependencies = extract_loading_dependencies(&mut cursor).unwrap();
        assert_eq!(dependencies.len(), 1);
        assert_eq!(dependencies[0].path(), "textures/detail.png");

        let mut cursor = Cursor::new(&bytes);
        let payload = load_cooked_payload(&mut cursor).unwrap();
        assert_eq!(payload, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn resources_without_metadata_store_none() {
        let resource: ResourcePtr = Arc::new(FakeTexture {
            pixels: vec![],
            references: vec![],
        });
        let cooked = CookedResource {
            resource,
            metadata: None,
        };

        let mut bytes = Vec::default();
        save_cooked_resource(&mut bytes, &cooked).unwrap();

        let mut cursor = Cursor::new(&bytes);
        assert!(load_cooked_metadata(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn corrupt_files_error_instead_of_panicking() {
        let mut cursor = Cursor::new(vec![0u8; 80]);
        assert!(load_cooked_metadata(&mut cursor).is_err());

        let mut bytes = Vec::default();
        save_cooked_resource(&mut bytes, &cooked_fixture()).unwrap();
        bytes.truncate(24);
        let mut cursor = Cursor::new(&bytes);
        assert!(load_cooked_metadata(&mut cursor).is_err());
    }
}
