//! Logical-to-physical block table.
//!
//! A `BlockTable` is an ordered, non-overlapping, gap-free partition of
//! `[0, media_size)` into [`Extent`]s, built once at open time by one of
//! the format parsers and never mutated afterward.

use crate::error::{Error, Result};

/// What a region of the logical media maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentKind {
    /// Copy bytes verbatim from the backing store.
    Passthrough,
    /// Read as all-zero without touching the backing store.
    ZeroFill,
    /// Never read; present only to keep the partition gap-free.
    Ignored,
    /// Producer-only annotation; never participates in read routing.
    Comment,
    /// End-of-table marker; never participates in read routing.
    Terminator,
    Adc,
    Zlib,
    Bzip2,
    Lzfse,
    Lzvn,
}

impl ExtentKind {
    /// Whether this kind ever needs bytes from a backing store.
    pub fn needs_source(self) -> bool {
        !matches!(self, ExtentKind::ZeroFill | ExtentKind::Ignored)
    }

    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            ExtentKind::Adc | ExtentKind::Zlib | ExtentKind::Bzip2 | ExtentKind::Lzfse | ExtentKind::Lzvn
        )
    }
}

/// Location of an extent's bytes in the backing store, when it has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalLocation {
    /// Identifies which backing file this extent reads from (band number
    /// for bundles, always 0 for a single-file source).
    pub file_id: u64,
    pub offset: u64,
    pub size: u64,
}

/// One region of the logical media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extent {
    pub logical_offset: u64,
    pub logical_size: u64,
    pub kind: ExtentKind,
    pub source: Option<PhysicalLocation>,
}

impl Extent {
    pub fn logical_end(&self) -> u64 {
        self.logical_offset + self.logical_size
    }
}

/// The full partition of a logical media's address space.
pub struct BlockTable {
    media_size: u64,
    /// Sorted by `logical_offset`; `Comment`/`Terminator` extents are
    /// dropped before this vector is built (see [`BlockTable::build`]).
    extents: Vec<Extent>,
}

impl BlockTable {
    /// Validates and sorts `extents`, dropping `Comment`/`Terminator`
    /// entries, then builds a `BlockTable` covering `[0, media_size)`
    /// with no gaps and no overlaps. Fails `Input{InvalidData}` if the
    /// partition has a gap, an overlap, or does not reach `media_size`.
    pub fn build(media_size: u64, mut extents: Vec<Extent>) -> Result<Self> {
        extents.retain(|e| !matches!(e.kind, ExtentKind::Comment | ExtentKind::Terminator));
        extents.sort_by_key(|e| e.logical_offset);

        let mut cursor = 0u64;
        for extent in &extents {
            if extent.logical_offset != cursor {
                return Err(Error::invalid_data(format!(
                    "block table has a gap or overlap at offset {}: next extent starts at {}",
                    cursor, extent.logical_offset
                )));
            }
            cursor = cursor.checked_add(extent.logical_size).ok_or_else(|| {
                Error::invalid_data("block table extent size overflows u64")
            })?;
        }
        if cursor != media_size {
            return Err(Error::invalid_data(format!(
                "block table covers {cursor} bytes, expected media size {media_size}"
            )));
        }

        Ok(Self { media_size, extents })
    }

    pub fn media_size(&self) -> u64 {
        self.media_size
    }

    /// Returns the extent containing `offset`, or `None` if `offset >=
    /// media_size`. O(log n) via binary search.
    pub fn find(&self, offset: u64) -> Option<&Extent> {
        if offset >= self.media_size {
            return None;
        }
        match self
            .extents
            .binary_search_by(|e| e.logical_offset.cmp(&offset))
        {
            Ok(i) => Some(&self.extents[i]),
            Err(0) => None,
            Err(i) => {
                let candidate = &self.extents[i - 1];
                if offset < candidate.logical_end() {
                    Some(candidate)
                } else {
                    None
                }
            }
        }
    }

    /// Iterates the extents covering `[offset, offset + length)`, each
    /// paired with the byte range within that extent (relative to its
    /// own `logical_offset`) the caller actually wants.
    pub fn slice(&self, offset: u64, length: u64) -> SliceIter<'_> {
        SliceIter {
            table: self,
            cursor: offset,
            end: offset.saturating_add(length).min(self.media_size),
        }
    }
}

pub struct SliceIter<'a> {
    table: &'a BlockTable,
    cursor: u64,
    end: u64,
}

impl<'a> Iterator for SliceIter<'a> {
    type Item = (&'a Extent, std::ops::Range<u64>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }
        let extent = self.table.find(self.cursor)?;
        let within_start = self.cursor - extent.logical_offset;
        let within_end = (self.end.min(extent.logical_end()) - extent.logical_offset).max(within_start);
        self.cursor = extent.logical_end().min(self.end);
        Some((extent, within_start..within_end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(offset: u64, size: u64, kind: ExtentKind) -> Extent {
        Extent {
            logical_offset: offset,
            logical_size: size,
            kind,
            source: None,
        }
    }

    #[test]
    fn rejects_gap() {
        let extents = vec![extent(0, 512, ExtentKind::ZeroFill), extent(1024, 512, ExtentKind::ZeroFill)];
        assert!(BlockTable::build(1536, extents).is_err());
    }

    #[test]
    fn rejects_overlap() {
        let extents = vec![extent(0, 512, ExtentKind::ZeroFill), extent(256, 512, ExtentKind::ZeroFill)];
        assert!(BlockTable::build(768, extents).is_err());
    }

    #[test]
    fn drops_terminator_and_comment() {
        let extents = vec![
            extent(0, 512, ExtentKind::ZeroFill),
            extent(512, 0, ExtentKind::Terminator),
        ];
        let table = BlockTable::build(512, extents).unwrap();
        assert_eq!(table.find(511).unwrap().kind, ExtentKind::ZeroFill);
    }

    #[test]
    fn find_and_slice_cover_boundaries() {
        let extents = vec![
            extent(0, 512, ExtentKind::ZeroFill),
            extent(512, 512, ExtentKind::Passthrough),
        ];
        let table = BlockTable::build(1024, extents).unwrap();
        assert_eq!(table.find(0).unwrap().kind, ExtentKind::ZeroFill);
        assert_eq!(table.find(512).unwrap().kind, ExtentKind::Passthrough);
        assert!(table.find(1024).is_none());

        let parts: Vec<_> = table.slice(256, 512).collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].1, 256..512);
        assert_eq!(parts[1].1, 0..256);
    }
}
