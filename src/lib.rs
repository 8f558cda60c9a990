//! Read-only access to Apple disk-image containers: UDIF (`.dmg`), the
//! `.sparseimage` single-file sparse format, and sparse bundles.
//!
//! ```no_run
//! use exhume_dmg::Image;
//! use std::io::Read;
//!
//! let mut image = Image::open("disk.dmg").unwrap();
//! let mut first_sector = [0u8; 512];
//! image.read_exact(&mut first_sector).unwrap();
//! ```

pub mod block_table;
pub mod cache;
pub mod chunk;
pub mod error;
pub mod format;
pub mod io_engine;
pub mod source;

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use error::{Error, Result};
use io_engine::IoEngine;

/// Default decode-cache budget: 64 MiB of decoded band/chunk bytes.
pub const DEFAULT_CACHE_BUDGET: u64 = 64 * 1024 * 1024;

struct Shared {
    engine: IoEngine,
    abort: AtomicBool,
}

/// A handle onto an opened disk image.
///
/// Cloning an `Image` is cheap: the clone shares the underlying engine,
/// cache, and abort flag with its parent, but starts with its own read
/// cursor, mirroring how the crate's single-file source hands out
/// independent cursors onto one shared file descriptor.
pub struct Image {
    shared: Arc<Shared>,
    position: u64,
}

impl Image {
    /// Opens a UDIF (`.dmg`) or `.sparseimage` file, auto-detecting which
    /// by sniffing the trailing `koly` magic before falling back to the
    /// sparse-image header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_budget(path, DEFAULT_CACHE_BUDGET)
    }

    pub fn open_with_budget(path: impl AsRef<Path>, cache_budget: u64) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("opening image {}", path.display());
        let parsed = match format::udif::open(path) {
            Ok(parsed) => parsed,
            Err(udif_err) => match format::sparse_image::open(path) {
                Ok(parsed) => parsed,
                Err(sparse_err) => {
                    log::debug!(
                        "{}: not a udif trailer ({udif_err}) nor a sparseimage header ({sparse_err})",
                        path.display()
                    );
                    return Err(sparse_err);
                }
            },
        };
        Ok(Self::from_parsed(parsed, cache_budget))
    }

    /// Opens a sparse-bundle directory (`Info.plist` + `bands/`).
    pub fn open_sparse_bundle(directory: impl AsRef<Path>) -> Result<Self> {
        Self::open_sparse_bundle_with_budget(directory, DEFAULT_CACHE_BUDGET)
    }

    pub fn open_sparse_bundle_with_budget(
        directory: impl AsRef<Path>,
        cache_budget: u64,
    ) -> Result<Self> {
        let directory = directory.as_ref();
        log::debug!("opening sparse bundle {}", directory.display());
        let parsed = format::sparse_bundle::open(directory)?;
        Ok(Self::from_parsed(parsed, cache_budget))
    }

    fn from_parsed(parsed: format::ParsedImage, cache_budget: u64) -> Self {
        let engine = IoEngine::new(parsed.block_table, parsed.sources, cache_budget);
        Self {
            shared: Arc::new(Shared {
                engine,
                abort: AtomicBool::new(false),
            }),
            position: 0,
        }
    }

    /// Total size in bytes of the logical media this image presents.
    pub fn media_size(&self) -> u64 {
        self.shared.engine.media_size()
    }

    /// Reads `buf.len()` bytes starting at `offset`, independent of the
    /// handle's seek cursor. Returns the number of bytes written, which
    /// is less than `buf.len()` only at end-of-media.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.shared.engine.read(offset, buf, &self.shared.abort)
    }

    /// Requests cancellation of any read currently in progress on this
    /// handle or any clone sharing it. The in-progress `read` returns
    /// `Runtime{AbortRequested}` with bytes already produced intact in
    /// the caller's buffer; the flag must be cleared before further
    /// reads will proceed.
    pub fn abort(&self) {
        self.shared.abort.store(true, Ordering::Relaxed);
    }

    /// Clears a previously set abort flag so reads can proceed again.
    pub fn clear_abort(&self) {
        self.shared.abort.store(false, Ordering::Relaxed);
    }

    pub fn bytes_cached(&self) -> u64 {
        self.shared.engine.cache_bytes_in_use()
    }
}

impl Clone for Image {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            position: 0,
        }
    }
}

impl Read for Image {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self
            .read_at(self.position, buf)
            .map_err(std::io::Error::other)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for Image {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let media_size = self.media_size();
        let new_position = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::End(delta) => media_size as i128 + delta as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
        };
        if new_position < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek to a negative position",
            ));
        }
        self.position = new_position as u64;
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read as _, Seek as _};

    #[test]
    fn clone_shares_engine_but_not_cursor() {
        let dir = std::env::temp_dir().join(format!(
            "exhume_dmg_lib_test_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .subsec_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let sparse_path = dir.join("disk.sparseimage");
        let mut header = vec![0u8; 52];
        header[0..4].copy_from_slice(b"sprs");
        header[8..12].copy_from_slice(&1u32.to_be_bytes());
        header[12..16].copy_from_slice(&2u32.to_be_bytes());
        // two bands, one sector each: band index vector, both absent.
        header.extend_from_slice(&0u32.to_be_bytes());
        header.extend_from_slice(&0u32.to_be_bytes());
        std::fs::write(&sparse_path, &header).unwrap();

        let mut image = Image::open(&sparse_path).unwrap();
        image.seek(SeekFrom::Start(100)).unwrap();
        let clone = image.clone();
        assert_eq!(clone.position, 0);

        let mut buf = [0xAAu8; 4];
        image.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 0]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
