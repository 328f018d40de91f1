//! Streaming parser for `#EXTM3U` channel catalogs.
//!
//! Catalogs are untrusted text and may hold thousands of entries, so parsing
//! is line oriented and incremental: the HTTP body is consumed as it arrives
//! and entries are emitted one by one.

mod parser;

pub use parser::{M3uParser, MAX_LINE_LEN, PlaylistEntry, parse_playlist, parse_playlist_str};
