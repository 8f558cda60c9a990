//! UDIF (Universal Disk Image Format) parser.
//!
//! Recognizes the 512-byte `koly` trailer at end-of-file, parses the
//! XML property list it points to for the `blkx` block tables, and
//! turns each table's chunk records into [`Extent`]s.

use std::io::Read;

use crate::block_table::{BlockTable, Extent, ExtentKind, PhysicalLocation};
use crate::error::{Error, Result};
use crate::source::{FileSource, Source};

pub const KOLY_MAGIC: &[u8; 4] = b"koly";
pub const KOLY_SIZE: u64 = 512;
const MISH_MAGIC: &[u8; 4] = b"mish";
const MISH_HEADER_SIZE: usize = 204;
const BLOCK_RUN_SIZE: usize = 40;
/// Offset of the authoritative chunk count within the 204-byte `mish`
/// header; the similarly-shaped field at offset 36 is a different count
/// and must not be used to size the chunk-record array.
const MISH_ACTUAL_BLOCK_COUNT_OFFSET: usize = 200;

const SECTOR_SIZE: u64 = 512;

pub struct KolyHeader {
    pub version: u32,
    pub header_size: u32,
    pub flags: u32,
    pub running_data_fork_offset: u64,
    pub data_fork_offset: u64,
    pub data_fork_length: u64,
    pub rsrc_fork_offset: u64,
    pub rsrc_fork_length: u64,
    pub segment_number: u32,
    pub segment_count: u32,
    pub segment_id: [u8; 16],
    pub data_checksum_type: u32,
    pub data_checksum_size: u32,
    pub data_checksum: [u8; 128],
    pub xml_offset: u64,
    pub xml_length: u64,
    pub master_checksum_type: u32,
    pub master_checksum_size: u32,
    pub master_checksum: [u8; 128],
    pub image_variant: u32,
    pub sector_count: u64,
}

impl KolyHeader {
    fn parse(data: &[u8; KOLY_SIZE as usize]) -> Result<Self> {
        if &data[0..4] != KOLY_MAGIC {
            return Err(Error::Input(crate::error::InputError::SignatureMismatch {
                message: "udif: koly trailer magic mismatch".into(),
            }));
        }
        let mut p = 4usize;
        macro_rules! u32_field {
            () => {{
                let v = u32::from_be_bytes(data[p..p + 4].try_into().unwrap());
                p += 4;
                v
            }};
        }
        macro_rules! u64_field {
            () => {{
                let v = u64::from_be_bytes(data[p..p + 8].try_into().unwrap());
                p += 8;
                v
            }};
        }
        let version = u32_field!();
        let header_size = u32_field!();
        let flags = u32_field!();
        let running_data_fork_offset = u64_field!();
        let data_fork_offset = u64_field!();
        let data_fork_length = u64_field!();
        let rsrc_fork_offset = u64_field!();
        let rsrc_fork_length = u64_field!();
        let segment_number = u32_field!();
        let segment_count = u32_field!();
        let mut segment_id = [0u8; 16];
        segment_id.copy_from_slice(&data[p..p + 16]);
        p += 16;
        let data_checksum_type = u32_field!();
        let data_checksum_size = u32_field!();
        let mut data_checksum = [0u8; 128];
        data_checksum.copy_from_slice(&data[p..p + 128]);
        p += 128;
        let xml_offset = u64_field!();
        let xml_length = u64_field!();
        // Reserved1 padding (120 bytes) between the XML fields and the
        // master checksum block.
        p += 120;
        let master_checksum_type = u32_field!();
        let master_checksum_size = u32_field!();
        let mut master_checksum = [0u8; 128];
        master_checksum.copy_from_slice(&data[p..p + 128]);
        p += 128;
        let image_variant = u32_field!();
        let sector_count = u64_field!();

        Ok(KolyHeader {
            version,
            header_size,
            flags,
            running_data_fork_offset,
            data_fork_offset,
            data_fork_length,
            rsrc_fork_offset,
            rsrc_fork_length,
            segment_number,
            segment_count,
            segment_id,
            data_checksum_type,
            data_checksum_size,
            data_checksum,
            xml_offset,
            xml_length,
            master_checksum_type,
            master_checksum_size,
            master_checksum,
            image_variant,
            sector_count,
        })
    }
}

fn block_type_to_kind(raw: u32) -> Result<ExtentKind> {
    Ok(match raw {
        0x00000000 => ExtentKind::ZeroFill,
        0x00000001 => ExtentKind::Passthrough,
        0x00000002 => ExtentKind::Ignored,
        0x80000004 => ExtentKind::Adc,
        0x80000005 => ExtentKind::Zlib,
        0x80000006 => ExtentKind::Bzip2,
        0x80000007 => ExtentKind::Lzfse,
        0x80000008 => ExtentKind::Lzvn,
        0x7FFFFFFE => ExtentKind::Comment,
        0xFFFFFFFF => ExtentKind::Terminator,
        other => {
            return Err(Error::Input(crate::error::InputError::UnsupportedValue {
                message: format!("udif: unrecognized blkx chunk type 0x{other:08x}"),
            }))
        }
    })
}

struct BlockRun {
    kind: ExtentKind,
    sector_number: u64,
    sector_count: u64,
    compressed_offset: u64,
    compressed_length: u64,
}

fn parse_mish(data: &[u8]) -> Result<Vec<BlockRun>> {
    if data.len() < MISH_HEADER_SIZE {
        return Err(Error::invalid_data("udif: mish header truncated"));
    }
    if &data[0..4] != MISH_MAGIC {
        return Err(Error::Input(crate::error::InputError::SignatureMismatch {
            message: "udif: blkx entry missing mish magic".into(),
        }));
    }
    let actual_block_count = u32::from_be_bytes(
        data[MISH_ACTUAL_BLOCK_COUNT_OFFSET..MISH_ACTUAL_BLOCK_COUNT_OFFSET + 4]
            .try_into()
            .unwrap(),
    ) as usize;

    let needed = MISH_HEADER_SIZE + actual_block_count * BLOCK_RUN_SIZE;
    if data.len() < needed {
        return Err(Error::invalid_data("udif: mish block run table truncated"));
    }

    let mut runs = Vec::with_capacity(actual_block_count);
    for i in 0..actual_block_count {
        let base = MISH_HEADER_SIZE + i * BLOCK_RUN_SIZE;
        let raw_type = u32::from_be_bytes(data[base..base + 4].try_into().unwrap());
        let _comment = u32::from_be_bytes(data[base + 4..base + 8].try_into().unwrap());
        let sector_number = u64::from_be_bytes(data[base + 8..base + 16].try_into().unwrap());
        let sector_count = u64::from_be_bytes(data[base + 16..base + 24].try_into().unwrap());
        let compressed_offset = u64::from_be_bytes(data[base + 24..base + 32].try_into().unwrap());
        let compressed_length = u64::from_be_bytes(data[base + 32..base + 40].try_into().unwrap());

        let kind = block_type_to_kind(raw_type)?;
        runs.push(BlockRun {
            kind,
            sector_number,
            sector_count,
            compressed_offset,
            compressed_length,
        });
    }
    Ok(runs)
}

/// Opens a UDIF (`.dmg`) file, parses its trailer and `blkx` tables, and
/// returns the resulting block table plus the single file source the
/// extents read from.
pub fn open(path: impl AsRef<std::path::Path>) -> Result<super::ParsedImage> {
    let source = FileSource::open(path)?;
    let file_size = source.size();
    if file_size < KOLY_SIZE {
        return Err(Error::invalid_data("udif: file too small to hold a koly trailer"));
    }

    let mut trailer = [0u8; KOLY_SIZE as usize];
    source.read_at(file_size - KOLY_SIZE, &mut trailer)?;
    let koly = KolyHeader::parse(&trailer)?;

    let mut xml = vec![0u8; koly.xml_length as usize];
    source.read_at(koly.xml_offset, &mut xml)?;
    let plist_value = plist::Value::from_reader(std::io::Cursor::new(&xml)).map_err(|e| {
        Error::invalid_data(format!("udif: failed to parse property list: {e}"))
    })?;

    let blkx_array = plist_value
        .as_dictionary()
        .and_then(|d| d.get("resource-fork"))
        .and_then(|v| v.as_dictionary())
        .and_then(|d| d.get("blkx"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::invalid_data("udif: property list missing resource-fork/blkx"))?;

    let mut extents = Vec::new();
    for entry in blkx_array {
        let data_value = entry
            .as_dictionary()
            .and_then(|d| d.get("Data"))
            .and_then(|v| v.as_data())
            .ok_or_else(|| Error::invalid_data("udif: blkx entry missing Data"))?;

        for run in parse_mish(data_value)? {
            if matches!(run.kind, ExtentKind::Comment | ExtentKind::Terminator) {
                extents.push(Extent {
                    logical_offset: run.sector_number * SECTOR_SIZE,
                    logical_size: run.sector_count * SECTOR_SIZE,
                    kind: run.kind,
                    source: None,
                });
                continue;
            }
            let source_location = if run.kind.needs_source() {
                Some(PhysicalLocation {
                    file_id: 0,
                    offset: koly.data_fork_offset + run.compressed_offset,
                    size: run.compressed_length,
                })
            } else {
                None
            };
            extents.push(Extent {
                logical_offset: run.sector_number * SECTOR_SIZE,
                logical_size: run.sector_count * SECTOR_SIZE,
                kind: run.kind,
                source: source_location,
            });
        }
    }

    let media_size = koly.sector_count * SECTOR_SIZE;
    let block_table = BlockTable::build(media_size, extents)?;

    Ok(super::ParsedImage {
        block_table,
        sources: vec![Box::new(source)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_type_mapping_matches_spec_codes() {
        assert_eq!(block_type_to_kind(0x00000000).unwrap(), ExtentKind::ZeroFill);
        assert_eq!(block_type_to_kind(0x00000001).unwrap(), ExtentKind::Passthrough);
        assert_eq!(block_type_to_kind(0x80000005).unwrap(), ExtentKind::Zlib);
        assert_eq!(block_type_to_kind(0x80000006).unwrap(), ExtentKind::Bzip2);
        assert_eq!(block_type_to_kind(0x80000007).unwrap(), ExtentKind::Lzfse);
        assert_eq!(block_type_to_kind(0x80000008).unwrap(), ExtentKind::Lzvn);
        assert_eq!(block_type_to_kind(0x7FFFFFFE).unwrap(), ExtentKind::Comment);
        assert_eq!(block_type_to_kind(0xFFFFFFFF).unwrap(), ExtentKind::Terminator);
        assert!(block_type_to_kind(0x12345678).is_err());
    }

    #[test]
    fn mish_uses_offset_200_block_count_not_offset_36() {
        use std::io::Write as _;

        let mut mish = Vec::new();
        mish.extend_from_slice(MISH_MAGIC);
        mish.extend_from_slice(&1u32.to_be_bytes()); // version
        mish.extend_from_slice(&0u64.to_be_bytes()); // first_sector
        mish.extend_from_slice(&10u64.to_be_bytes()); // sector_count
        mish.extend_from_slice(&0u64.to_be_bytes()); // data_offset
        mish.extend_from_slice(&0u32.to_be_bytes()); // buffers_needed
        mish.extend_from_slice(&999u32.to_be_bytes()); // offset 36: wrong count, must be ignored
        mish.extend_from_slice(&[0u8; 24]);
        mish.extend_from_slice(&2u32.to_be_bytes());
        mish.extend_from_slice(&32u32.to_be_bytes());
        mish.extend_from_slice(&[0u8; 128]);
        mish.extend_from_slice(&2u32.to_be_bytes()); // offset 200: actual count

        let mut run0 = Vec::new();
        run0.write_all(&0u32.to_be_bytes()).unwrap(); // ZeroFill
        run0.write_all(&0u32.to_be_bytes()).unwrap();
        run0.write_all(&0u64.to_be_bytes()).unwrap();
        run0.write_all(&10u64.to_be_bytes()).unwrap();
        run0.write_all(&0u64.to_be_bytes()).unwrap();
        run0.write_all(&0u64.to_be_bytes()).unwrap();

        let mut run1 = Vec::new();
        run1.write_all(&0xFFFFFFFFu32.to_be_bytes()).unwrap(); // Terminator
        run1.write_all(&0u32.to_be_bytes()).unwrap();
        run1.write_all(&10u64.to_be_bytes()).unwrap();
        run1.write_all(&0u64.to_be_bytes()).unwrap();
        run1.write_all(&0u64.to_be_bytes()).unwrap();
        run1.write_all(&0u64.to_be_bytes()).unwrap();

        mish.extend_from_slice(&run0);
        mish.extend_from_slice(&run1);

        let runs = parse_mish(&mish).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].kind, ExtentKind::ZeroFill);
        assert_eq!(runs[1].kind, ExtentKind::Terminator);
    }
}
