//! Streaming zlib readers.

pub mod inflate;
