//! Pure decompressors for the three Apple-specific chunk codecs.
//!
//! Each decoder takes a compressed byte slice and a caller-supplied
//! output buffer and produces the number of bytes written; none of them
//! touch the backing store or the cache.

pub mod adc;
pub mod lzfse;
pub mod lzvn;

use crate::error::{Error, Result};

/// Platform-independent cap on a single compressed chunk, replacing the
/// reference library's signed `SSIZE_MAX` guard (see design notes).
pub const MAX_CHUNK_SIZE: u64 = 1 << 30;

pub(crate) fn check_chunk_size(len: usize) -> Result<()> {
    if len as u64 > MAX_CHUNK_SIZE {
        return Err(Error::value_exceeds_maximum(
            "compressed chunk size exceeds maximum",
            len as u64,
            MAX_CHUNK_SIZE,
        ));
    }
    Ok(())
}
