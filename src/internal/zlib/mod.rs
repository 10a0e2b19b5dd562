//! Zlib framing used by loose objects and pack entries.

pub mod stream;
