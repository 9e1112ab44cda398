//! Raw region feed loading.
//!
//! `bestiary-feed` turns the published JSON documents of one region into
//! typed values: decoded instructions and trimmed monster records. It owns
//! the feed quirks (pseudo-CSV payloads, quote substitution, checksum rows,
//! length-prefixed ref lists) so nothing downstream has to know them.

pub mod loader;
pub mod parse;
pub mod raw;

pub use loader::{InstructionFeed, LoadResult, RegionData, load_cards, load_instructions, load_region};
pub use parse::tokenize_blob;
pub use raw::RawCard;
