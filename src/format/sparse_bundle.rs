//! Sparse-bundle parser.
//!
//! A sparse bundle is a directory: `Info.plist` carries the band size
//! and media size, and a `bands/` subdirectory holds one file per
//! written band, named as a lowercase hexadecimal band number. Band
//! discovery glob-matches every file in `bands/`, the same technique
//! the surrounding codebase uses to discover a multi-segment evidence
//! file's numbered siblings, adapted here to hexadecimal band filenames
//! instead of numeric segment suffixes.

use std::path::Path;

use crate::block_table::{BlockTable, Extent, ExtentKind, PhysicalLocation};
use crate::error::{Error, Result};
use crate::source::BundleSource;

pub fn open(directory: impl AsRef<Path>) -> Result<super::ParsedImage> {
    let directory = directory.as_ref();
    let info_plist_path = directory.join("Info.plist");
    let plist_bytes = std::fs::read(&info_plist_path).map_err(|e| {
        Error::Io(crate::error::IoError::Open {
            message: format!("{}: {e}", info_plist_path.display()),
        })
    })?;
    let plist_value = plist::Value::from_reader(std::io::Cursor::new(&plist_bytes))
        .map_err(|e| Error::invalid_data(format!("sparse bundle: failed to parse Info.plist: {e}")))?;
    let dict = plist_value
        .as_dictionary()
        .ok_or_else(|| Error::invalid_data("sparse bundle: Info.plist is not a dictionary"))?;

    let band_size = dict
        .get("band-size")
        .and_then(|v| v.as_unsigned_integer())
        .ok_or_else(|| Error::invalid_data("sparse bundle: Info.plist missing band-size"))?;
    let media_size = dict
        .get("size")
        .and_then(|v| v.as_unsigned_integer())
        .ok_or_else(|| Error::invalid_data("sparse bundle: Info.plist missing size"))?;

    if band_size == 0 {
        return Err(Error::invalid_data("sparse bundle: band-size is zero"));
    }

    let bands_dir = directory.join("bands");
    let present_bands = discover_bands(&bands_dir)?;

    let band_count = media_size.div_ceil(band_size) as usize;
    let mut extents = Vec::with_capacity(band_count);
    for logical_band in 0..band_count as u64 {
        let logical_offset = logical_band * band_size;
        let remaining = media_size - logical_offset;
        let logical_size = remaining.min(band_size);

        if present_bands.contains(&logical_band) {
            extents.push(Extent {
                logical_offset,
                logical_size,
                kind: ExtentKind::Passthrough,
                source: Some(PhysicalLocation {
                    file_id: 0,
                    offset: logical_band * band_size,
                    size: logical_size,
                }),
            });
        } else {
            extents.push(Extent {
                logical_offset,
                logical_size,
                kind: ExtentKind::ZeroFill,
                source: None,
            });
        }
    }

    let block_table = BlockTable::build(media_size, extents)?;
    let source = BundleSource::new(bands_dir, band_size);
    Ok(super::ParsedImage {
        block_table,
        sources: vec![Box::new(source)],
    })
}

/// Enumerates `bands/*` and parses each filename as a lowercase hex band
/// number, mirroring the surrounding codebase's glob-then-sort segment
/// discovery but keyed on hex band names instead of numeric suffixes.
fn discover_bands(bands_dir: &Path) -> Result<std::collections::BTreeSet<u64>> {
    let mut pattern_path = bands_dir.to_path_buf();
    pattern_path.push("*");
    let pattern = pattern_path
        .to_str()
        .ok_or_else(|| Error::invalid_data("sparse bundle: bands directory path is not valid UTF-8"))?
        .to_string();

    let mut bands = std::collections::BTreeSet::new();
    let entries = glob::glob(&pattern)
        .map_err(|e| Error::invalid_data(format!("sparse bundle: glob error: {e}")))?;
    for entry in entries.filter_map(std::result::Result::ok) {
        let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Ok(band_number) = u64::from_str_radix(name, 16) {
            bands.insert(band_number);
        }
    }
    Ok(bands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_bands_parses_hex_filenames() {
        let dir = std::env::temp_dir().join(format!(
            "exhume_dmg_bundle_test_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .subsec_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("0"), b"a").unwrap();
        std::fs::write(dir.join("1f"), b"b").unwrap();
        std::fs::write(dir.join("not-hex-name-with-dash"), b"c").unwrap();

        let bands = discover_bands(&dir).unwrap();
        assert!(bands.contains(&0));
        assert!(bands.contains(&0x1f));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
