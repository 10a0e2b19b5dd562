//! In-flight representation of a pack entry while it is being decoded: either a fully
//! resolved base object or an undeltified payload still waiting on its base.

use crate::hash::ObjectHash;
use crate::internal::object::types::ObjectType;

/// What a [`CacheObject`] currently knows about its own identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheObjectInfo {
    /// A non-delta object: its final type and hash are already known.
    BaseObject(ObjectType, ObjectHash),
    /// An ofs-delta entry, identified by the pack offset of its base.
    OffsetDelta(usize),
    /// A ref-delta entry, identified by the hash of its base.
    HashDelta(ObjectHash),
}

/// A pack entry mid-decode: its inflated bytes plus enough bookkeeping to resolve deltas
/// and to rebuild a `.idx` entry once the final hash is known.
#[derive(Debug, Clone)]
pub struct CacheObject {
    pub info: CacheObjectInfo,
    /// Byte offset of this entry's header within the pack.
    pub offset: usize,
    /// CRC32 of the entry's compressed bytes as they appeared in the pack.
    pub crc32: u32,
    /// Fully inflated bytes: literal object content for a base object, or delta
    /// instructions for a still-undeltified entry.
    pub data_decompressed: Vec<u8>,
    /// Running total of decompressed bytes held in memory, shared across a decode pass.
    pub mem_recorder: Option<std::sync::Arc<std::sync::atomic::AtomicUsize>>,
    pub is_delta_in_pack: bool,
}

impl CacheObject {
    pub fn base(obj_type: ObjectType, hash: ObjectHash, offset: usize, crc32: u32, data: Vec<u8>) -> Self {
        CacheObject {
            info: CacheObjectInfo::BaseObject(obj_type, hash),
            offset,
            crc32,
            data_decompressed: data,
            mem_recorder: None,
            is_delta_in_pack: false,
        }
    }

    pub fn is_base(&self) -> bool {
        matches!(self.info, CacheObjectInfo::BaseObject(..))
    }
}
