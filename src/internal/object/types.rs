//! Git object type enumeration shared by the object model and the pack codec.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::errors::GitError;

/// In Git, each storable object type is assigned a small integer, used both as the
/// pack-entry type tag and (loosely) as a display discriminant.
///
/// * `Blob`: the content of a file.
/// * `Tree`: a directory listing (name -> mode/hash entries).
/// * `Commit`: a snapshot pointer with parents, author/committer, and a message.
/// * `Tag`: an annotated tag pointing at another object.
/// * `OffsetDelta` / `HashDelta`: pack-internal delta encodings; never appear as a
///   loose object or as the type of a fully reconstructed object.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Commit = 1,
    Tree,
    Blob,
    Tag,
    OffsetDelta = 6,
    HashDelta = 7,
}

const COMMIT_OBJECT_TYPE: &[u8] = b"commit";
const TREE_OBJECT_TYPE: &[u8] = b"tree";
const BLOB_OBJECT_TYPE: &[u8] = b"blob";
const TAG_OBJECT_TYPE: &[u8] = b"tag";

impl Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ObjectType::Blob => write!(f, "blob"),
            ObjectType::Tree => write!(f, "tree"),
            ObjectType::Commit => write!(f, "commit"),
            ObjectType::Tag => write!(f, "tag"),
            ObjectType::OffsetDelta => write!(f, "ofs-delta"),
            ObjectType::HashDelta => write!(f, "ref-delta"),
        }
    }
}

impl ObjectType {
    /// Convert object type to the 3-bit pack header type id (§4.3 of the wire format).
    pub fn to_pack_type_u8(&self) -> Result<u8, GitError> {
        match self {
            ObjectType::Commit => Ok(1),
            ObjectType::Tree => Ok(2),
            ObjectType::Blob => Ok(3),
            ObjectType::Tag => Ok(4),
            ObjectType::OffsetDelta => Ok(6),
            ObjectType::HashDelta => Ok(7),
        }
    }

    /// Decode a 3-bit pack header type id to an object type.
    pub fn from_pack_type_u8(number: u8) -> Result<ObjectType, GitError> {
        match number {
            1 => Ok(ObjectType::Commit),
            2 => Ok(ObjectType::Tree),
            3 => Ok(ObjectType::Blob),
            4 => Ok(ObjectType::Tag),
            6 => Ok(ObjectType::OffsetDelta),
            7 => Ok(ObjectType::HashDelta),
            _ => Err(GitError::InvalidObjectType(format!(
                "invalid pack object type number: {number}"
            ))),
        }
    }

    /// The type name as it appears in the loose-object header (`type SP size NUL`).
    pub fn to_bytes(&self) -> Result<&'static [u8], GitError> {
        match self {
            ObjectType::Commit => Ok(COMMIT_OBJECT_TYPE),
            ObjectType::Tree => Ok(TREE_OBJECT_TYPE),
            ObjectType::Blob => Ok(BLOB_OBJECT_TYPE),
            ObjectType::Tag => Ok(TAG_OBJECT_TYPE),
            ObjectType::OffsetDelta | ObjectType::HashDelta => Err(GitError::InvalidObjectType(
                "delta types have no loose-object header".to_string(),
            )),
        }
    }

    /// Parses the type name as it appears in a loose-object header or `cat-file -t`.
    pub fn from_string(s: &str) -> Result<ObjectType, GitError> {
        match s {
            "blob" => Ok(ObjectType::Blob),
            "tree" => Ok(ObjectType::Tree),
            "commit" => Ok(ObjectType::Commit),
            "tag" => Ok(ObjectType::Tag),
            _ => Err(GitError::InvalidObjectType(s.to_string())),
        }
    }

    /// Whether this type can appear as a fully reconstructed (non-delta) object.
    pub fn is_base(&self) -> bool {
        !matches!(self, ObjectType::OffsetDelta | ObjectType::HashDelta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_type_roundtrip() {
        for t in [
            ObjectType::Commit,
            ObjectType::Tree,
            ObjectType::Blob,
            ObjectType::Tag,
            ObjectType::OffsetDelta,
            ObjectType::HashDelta,
        ] {
            let n = t.to_pack_type_u8().unwrap();
            assert_eq!(ObjectType::from_pack_type_u8(n).unwrap(), t);
        }
    }

    #[test]
    fn loose_header_roundtrip() {
        for t in [ObjectType::Commit, ObjectType::Tree, ObjectType::Blob, ObjectType::Tag] {
            let name = std::str::from_utf8(t.to_bytes().unwrap()).unwrap();
            assert_eq!(ObjectType::from_string(name).unwrap(), t);
        }
    }

    #[test]
    fn delta_types_have_no_loose_header() {
        assert!(ObjectType::OffsetDelta.to_bytes().is_err());
        assert!(ObjectType::HashDelta.to_bytes().is_err());
    }

    #[test]
    fn is_base_excludes_deltas() {
        assert!(ObjectType::Blob.is_base());
        assert!(!ObjectType::OffsetDelta.is_base());
        assert!(!ObjectType::HashDelta.is_base());
    }
}
