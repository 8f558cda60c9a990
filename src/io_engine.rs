//! Read routing.
//!
//! Ties the block table, sources, decoders, and cache together into a
//! single `read_at`: walk the extents covering the requested range, and
//! for each one either copy straight from the backing store, memset
//! zero, or fetch (and cache) a decoded chunk.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::block_table::{BlockTable, Extent, ExtentKind, PhysicalLocation};
use crate::cache::{Cache, Fingerprint};
use crate::chunk::{adc, lzfse, lzvn};
use crate::error::{Error, Result, RuntimeError};
use crate::source::Source;

/// Executes reads against a parsed image: a block table, the source(s)
/// its extents point into, and a shared decode cache.
pub struct IoEngine {
    block_table: BlockTable,
    sources: Vec<Box<dyn Source>>,
    cache: Cache,
}

impl IoEngine {
    pub fn new(block_table: BlockTable, sources: Vec<Box<dyn Source>>, cache_budget: u64) -> Self {
        Self {
            block_table,
            sources,
            cache: Cache::new(cache_budget),
        }
    }

    pub fn media_size(&self) -> u64 {
        self.block_table.media_size()
    }

    pub fn cache_bytes_in_use(&self) -> u64 {
        self.cache.bytes_in_use()
    }

    /// Reads `buf.len()` bytes starting at `logical_offset`, clamped to
    /// media size, and returns the number of bytes actually written.
    /// Polls `abort` between extents so a long multi-extent read can be
    /// cancelled promptly.
    pub fn read(&self, logical_offset: u64, buf: &mut [u8], abort: &AtomicBool) -> Result<usize> {
        let media_size = self.block_table.media_size();
        if logical_offset >= media_size || buf.is_empty() {
            return Ok(0);
        }
        let available = media_size - logical_offset;
        let want = (buf.len() as u64).min(available) as usize;

        let mut written = 0usize;
        for (extent, within) in self.block_table.slice(logical_offset, want as u64) {
            if abort.load(Ordering::Relaxed) {
                return Err(Error::Runtime(RuntimeError::AbortRequested));
            }
            let span = (within.end - within.start) as usize;
            let dest = &mut buf[written..written + span];
            self.fill_extent(extent, within.start, dest)?;
            written += span;
        }
        Ok(written)
    }

    fn fill_extent(&self, extent: &Extent, within_offset: u64, dest: &mut [u8]) -> Result<()> {
        match extent.kind {
            ExtentKind::ZeroFill | ExtentKind::Ignored => {
                dest.fill(0);
                Ok(())
            }
            ExtentKind::Comment | ExtentKind::Terminator => {
                // Dropped from the block table at build time; routing
                // would be a bug elsewhere in the crate, not bad input.
                unreachable!("comment/terminator extents never reach read routing")
            }
            ExtentKind::Passthrough => {
                let location = extent
                    .source
                    .as_ref()
                    .ok_or_else(|| Error::invalid_data("passthrough extent missing a source location"))?;
                let source = self.source_for(location)?;
                source.read_at(location.offset + within_offset, dest)
            }
            ExtentKind::Adc | ExtentKind::Zlib | ExtentKind::Bzip2 | ExtentKind::Lzfse | ExtentKind::Lzvn => {
                let location = extent
                    .source
                    .as_ref()
                    .ok_or_else(|| Error::invalid_data("compressed extent missing a source location"))?;
                let decoded = self.decoded_extent(extent, location)?;
                let start = within_offset as usize;
                let end = start + dest.len();
                if end > decoded.len() {
                    return Err(Error::invalid_data(
                        "decoded chunk is shorter than the logical extent it backs",
                    ));
                }
                dest.copy_from_slice(&decoded[start..end]);
                Ok(())
            }
        }
    }

    fn source_for(&self, location: &PhysicalLocation) -> Result<&dyn Source> {
        self.sources
            .get(location.file_id as usize)
            .map(|b| b.as_ref())
            .ok_or_else(|| Error::invalid_data(format!("no source for file_id {}", location.file_id)))
    }

    /// Fetches the fully decoded bytes for a compressed extent, decoding
    /// on a cache miss and sharing the result with any other reader
    /// racing on the same physical region.
    fn decoded_extent(&self, extent: &Extent, location: &PhysicalLocation) -> Result<Arc<Vec<u8>>> {
        let fingerprint = Fingerprint {
            file_id: location.file_id,
            physical_offset: location.offset,
            physical_size: location.size,
        };
        let kind = extent.kind;
        let logical_size = extent.logical_size as usize;
        self.cache.get(fingerprint, || {
            let source = self.source_for(location)?;
            let mut compressed = vec![0u8; location.size as usize];
            source.read_at(location.offset, &mut compressed)?;
            decode_chunk(kind, &compressed, logical_size)
        })
    }
}

/// Decodes one compressed chunk into a freshly allocated buffer sized to
/// the logical extent it backs.
fn decode_chunk(kind: ExtentKind, compressed: &[u8], logical_size: usize) -> Result<Vec<u8>> {
    let mut output = vec![0u8; logical_size];
    let written = match kind {
        ExtentKind::Adc => adc::decompress(compressed, &mut output)?,
        ExtentKind::Lzvn => lzvn::decompress(compressed, &mut output)?,
        ExtentKind::Lzfse => lzfse::decompress(compressed, &mut output)?,
        ExtentKind::Zlib => decode_zlib(compressed, &mut output)?,
        ExtentKind::Bzip2 => decode_bzip2(compressed, &mut output)?,
        _ => unreachable!("decode_chunk only called for compressed extent kinds"),
    };
    if written != logical_size {
        return Err(Error::decompress_failed(format!(
            "decoded {written} bytes, expected {logical_size} to fill the logical extent"
        )));
    }
    Ok(output)
}

fn decode_zlib(compressed: &[u8], output: &mut [u8]) -> Result<usize> {
    use std::io::Read;
    let mut decoder = flate2::read::ZlibDecoder::new(compressed);
    decoder
        .read_exact(output)
        .map_err(|e| Error::decompress_failed(format!("zlib: {e}")))?;
    Ok(output.len())
}

fn decode_bzip2(compressed: &[u8], output: &mut [u8]) -> Result<usize> {
    use std::io::Read;
    let mut decoder = bzip2::read::BzDecoder::new(compressed);
    decoder
        .read_exact(output)
        .map_err(|e| Error::decompress_failed(format!("bzip2: {e}")))?;
    Ok(output.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_table::{BlockTable, Extent, ExtentKind, PhysicalLocation};
    use crate::source::Source;

    struct FakeSource(Vec<u8>);

    impl Source for FakeSource {
        fn size(&self) -> u64 {
            self.0.len() as u64
        }
        fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
            let start = offset as usize;
            buf.copy_from_slice(&self.0[start..start + buf.len()]);
            Ok(())
        }
    }

    #[test]
    fn reads_zero_fill_and_passthrough_across_a_boundary() {
        let extents = vec![
            Extent {
                logical_offset: 0,
                logical_size: 4,
                kind: ExtentKind::ZeroFill,
                source: None,
            },
            Extent {
                logical_offset: 4,
                logical_size: 4,
                kind: ExtentKind::Passthrough,
                source: Some(PhysicalLocation { file_id: 0, offset: 0, size: 4 }),
            },
        ];
        let table = BlockTable::build(8, extents).unwrap();
        let engine = IoEngine::new(table, vec![Box::new(FakeSource(vec![9, 9, 9, 9]))], 1024);

        let mut buf = [0xFFu8; 8];
        let abort = AtomicBool::new(false);
        let n = engine.read(0, &mut buf, &abort).unwrap();
        assert_eq!(n, 8);
        assert_eq!(&buf, &[0, 0, 0, 0, 9, 9, 9, 9]);
    }

    #[test]
    fn read_past_eof_truncates() {
        let extents = vec![Extent {
            logical_offset: 0,
            logical_size: 4,
            kind: ExtentKind::ZeroFill,
            source: None,
        }];
        let table = BlockTable::build(4, extents).unwrap();
        let engine = IoEngine::new(table, vec![Box::new(FakeSource(vec![]))], 1024);

        let mut buf = [0xFFu8; 10];
        let abort = AtomicBool::new(false);
        let n = engine.read(2, &mut buf, &abort).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn abort_flag_stops_multi_extent_read() {
        let extents = vec![
            Extent {
                logical_offset: 0,
                logical_size: 4,
                kind: ExtentKind::ZeroFill,
                source: None,
            },
            Extent {
                logical_offset: 4,
                logical_size: 4,
                kind: ExtentKind::ZeroFill,
                source: None,
            },
        ];
        let table = BlockTable::build(8, extents).unwrap();
        let engine = IoEngine::new(table, vec![Box::new(FakeSource(vec![]))], 1024);

        let mut buf = [0u8; 8];
        let abort = AtomicBool::new(true);
        let err = engine.read(0, &mut buf, &abort).unwrap_err();
        assert!(matches!(err, Error::Runtime(RuntimeError::AbortRequested)));
    }

    #[test]
    fn decoded_chunk_wrong_size_is_an_error() {
        let extents = vec![Extent {
            logical_offset: 0,
            logical_size: 4,
            kind: ExtentKind::Adc,
            source: Some(PhysicalLocation { file_id: 0, offset: 0, size: 1 }),
        }];
        let table = BlockTable::build(4, extents).unwrap();
        // 0x00 is an ADC literal-run header claiming 1 literal byte but
        // the chunk is truncated before it, so decode fails before size
        // mismatch is even reached -- still exercises the error path.
        let engine = IoEngine::new(table, vec![Box::new(FakeSource(vec![0x00]))], 1024);
        let mut buf = [0u8; 4];
        let abort = AtomicBool::new(false);
        assert!(engine.read(0, &mut buf, &abort).is_err());
    }
}
