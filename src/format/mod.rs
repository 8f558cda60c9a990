//! Container format detection and parsing.
//!
//! Each sub-module recognizes one on-disk shape and produces a
//! [`crate::block_table::BlockTable`] plus whatever `Source` the image
//! needs for reads. None of these parsers touch the cache or decoders;
//! they only describe where bytes live.

pub mod sparse_bundle;
pub mod sparse_image;
pub mod udif;

use crate::block_table::BlockTable;
use crate::source::Source;

/// What [`open`](crate::Image::open) produced: a media partition plus
/// the source(s) its extents read from.
pub struct ParsedImage {
    pub block_table: BlockTable,
    pub sources: Vec<Box<dyn Source>>,
}
