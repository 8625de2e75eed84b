// Binary block container used for cooked resource files.
//
// File layout:
// [4] magic number encoded as u32 (0x4B4C0001)
// [4] file tag (arbitrary 4 bytes for user)
// [4] version (arbitrary meaning for user, encoded as u32)
// [4] block count (encoded as u32)
// [8] bytes indicating 0 (0x00)
// [8*n] ending offset of each block
// [x] pad to 16 byte offset
// [n*len(n)] block data, each block padded to a 16 byte offset
//
// Individual blocks can be fetched without reading the rest of the file, which
// is what makes selective header loads (metadata only, dependency list only)
// cheap for large payloads.

use std::convert::TryInto;
use std::io::{Read, Seek, SeekFrom, Write};

const MAGIC_NUMBER: u32 = 0x4B4C0001;
const HEADER_SIZE_IN_BYTES: u64 = 16;
const BLOCK_LENGTH_SIZE_IN_BYTES: u64 = 8;
const BLOCK_ALIGNMENT_IN_BYTES: u64 = 16;

fn align_up(value: u64) -> u64 {
    ((value + BLOCK_ALIGNMENT_IN_BYTES - 1) / BLOCK_ALIGNMENT_IN_BYTES) * BLOCK_ALIGNMENT_IN_BYTES
}

fn corrupt(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string())
}

pub struct BlockFileWriter<'a> {
    file_tag: u32,
    version: u32,
    blocks: Vec<&'a [u8]>,
}

impl<'a> BlockFileWriter<'a> {
    pub fn new(
        file_tag: [u8; 4],
        version: u32,
    ) -> Self {
        BlockFileWriter {
            file_tag: u32::from_ne_bytes(file_tag),
            version,
            blocks: Vec::default(),
        }
    }

    pub fn add_block(
        &mut self,
        data: &'a [u8],
    ) {
        self.blocks.push(data);
    }

    pub fn write<W: Write>(
        &self,
        writer: &mut W,
    ) -> std::io::Result<()> {
        //
        // 16 byte header
        //
        writer.write_all(&MAGIC_NUMBER.to_ne_bytes())?;
        writer.write_all(&self.file_tag.to_ne_bytes())?;
        writer.write_all(&self.version.to_ne_bytes())?;
        writer.write_all(&(self.blocks.len() as u32).to_ne_bytes())?;

        //
        // A single u64 zero + N u64 block end positions
        //
        writer.write_all(&0u64.to_ne_bytes())?;

        let mut block_begin = 0u64;
        for block in &self.blocks {
            let block_end = block_begin + block.len() as u64;
            writer.write_all(&block_end.to_ne_bytes())?;

            // The next block begins at the next 16 byte boundary
            block_begin = align_up(block_end);
        }

        //
        // Pad so block 0 starts at a 16 byte offset
        //
        let table_end =
            HEADER_SIZE_IN_BYTES + (self.blocks.len() as u64 + 1) * BLOCK_LENGTH_SIZE_IN_BYTES;
        if table_end % 16 == 8 {
            writer.write_all(&0u64.to_ne_bytes())?;
        } else {
            debug_assert!(table_end % 16 == 0);
        }

        //
        // Write the blocks
        //
        for block in &self.blocks {
            writer.write_all(block)?;
            if block.len() as u64 % BLOCK_ALIGNMENT_IN_BYTES != 0 {
                let required_padding =
                    BLOCK_ALIGNMENT_IN_BYTES - block.len() as u64 % BLOCK_ALIGNMENT_IN_BYTES;
                for _ in 0..required_padding {
                    writer.write_all(&[0u8])?;
                }
            }
        }

        Ok(())
    }
}

pub struct BlockFileReader {
    file_tag: u32,
    version: u32,
    // block_ends[n] is the end of block n-1 (element 0 is always zero)
    block_ends: Vec<u64>,
}

impl BlockFileReader {
    pub fn read_header<R: Read + Seek>(reader: &mut R) -> std::io::Result<BlockFileReader> {
        let mut header = [0u8; 16];
        reader.read_exact(&mut header).map_err(|_| corrupt("File too short"))?;

        let magic_number = u32::from_ne_bytes(header[0..4].try_into().unwrap());
        if magic_number != MAGIC_NUMBER {
            return Err(corrupt("Bad magic number"));
        }

        let file_tag = u32::from_ne_bytes(header[4..8].try_into().unwrap());
        let version = u32::from_ne_bytes(header[8..12].try_into().unwrap());
        let block_count = u32::from_ne_bytes(header[12..16].try_into().unwrap()) as usize;

        // The table is small, an absurd block count means a corrupt file
        if block_count > 0xFFFF {
            return Err(corrupt("Unreasonable block count"));
        }

        let mut block_ends = Vec::with_capacity(block_count + 1);
        for _ in 0..(block_count + 1) {
            let mut bytes = [0u8; 8];
            reader.read_exact(&mut bytes).map_err(|_| corrupt("Truncated block table"))?;
            block_ends.push(u64::from_ne_bytes(bytes));
        }

        if block_ends.first() != Some(&0) {
            return Err(corrupt("Bad block table"));
        }

        Ok(BlockFileReader {
            file_tag,
            version,
            block_ends,
        })
    }

    pub fn file_tag_as_u8(&self) -> [u8; 4] {
        self.file_tag.to_ne_bytes()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn block_count(&self) -> usize {
        self.block_ends.len() - 1
    }

    fn data_offset(&self) -> u64 {
        let table_end =
            HEADER_SIZE_IN_BYTES + self.block_ends.len() as u64 * BLOCK_LENGTH_SIZE_IN_BYTES;
        align_up(table_end)
    }

    pub fn read_block<R: Read + Seek>(
        &self,
        reader: &mut R,
        index: usize,
    ) -> std::io::Result<Vec<u8>> {
        if index >= self.block_count() {
            return Err(corrupt("Block index out of range"));
        }

        let begin = align_up(self.block_ends[index]);
        let end = self.block_ends[index + 1];
        if end < begin {
            return Err(corrupt("Bad block table"));
        }

        reader.seek(SeekFrom::Start(self.data_offset() + begin))?;
        let mut data = vec![0u8; (end - begin) as usize];
        reader.read_exact(&mut data).map_err(|_| corrupt("Truncated block data"))?;
        Ok(data)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip_blocks() {
        let block0 = vec![1u8; 5];
        let block1 = vec![2u8; 16];
        let block2 = vec![3u8; 33];

        let mut writer = BlockFileWriter::new(*b"TEST", 7);
        writer.add_block(&block0);
        writer.add_block(&block1);
        writer.add_block(&block2);

        let mut bytes = Vec::default();
        writer.write(&mut bytes).unwrap();

        let mut cursor = Cursor::new(bytes);
        let reader = BlockFileReader::read_header(&mut cursor).unwrap();
        assert_eq!(reader.file_tag_as_u8(), *b"TEST");
        assert_eq!(reader.version(), 7);
        assert_eq!(reader.block_count(), 3);
        assert_eq!(reader.read_block(&mut cursor, 0).unwrap(), block0);
        assert_eq!(reader.read_block(&mut cursor, 1).unwrap(), block1);
        assert_eq!(reader.read_block(&mut cursor, 2).unwrap(), block2);
    }

    #[test]
    fn blocks_can_be_read_out_of_order() {
        let block0 = vec![9u8; 100];
        let block1 = b"hello".to_vec();

        let mut writer = BlockFileWriter::new(*b"ABCD", 1);
        writer.add_block(&block0);
        writer.add_block(&block1);

        let mut bytes = Vec::default();
        writer.write(&mut bytes).unwrap();

        let mut cursor = Cursor::new(bytes);
        let reader = BlockFileReader::read_header(&mut cursor).unwrap();
        assert_eq!(reader.read_block(&mut cursor, 1).unwrap(), block1);
        assert_eq!(reader.read_block(&mut cursor, 0).unwrap(), block0);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![0u8; 64];
        let mut cursor = Cursor::new(bytes);
        assert!(BlockFileReader::read_header(&mut cursor).is_err());
    }

    #[test]
    fn rejects_truncated_file() {
        let block0 = vec![1u8; 64];
        let mut writer = BlockFileWriter::new(*b"TEST", 1);
        writer.add_block(&block0);

        let mut bytes = Vec::default();
        writer.write(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 32);

        let mut cursor = Cursor::new(bytes);
        let reader = BlockFileReader::read_header(&mut cursor).unwrap();
        assert!(reader.read_block(&mut cursor, 0).is_err());
    }
}
