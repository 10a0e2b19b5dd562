//! The Blob object stores the raw content of a file, with no name or mode information
//! attached — that metadata lives in the tree entry pointing at it.

use std::fmt::Display;

use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::internal::object::ObjectTrait;
use crate::internal::object::types::ObjectType;

#[derive(Eq, Debug, Clone)]
pub struct Blob {
    pub id: ObjectHash,
    pub data: Vec<u8>,
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.data))
    }
}

impl Blob {
    /// Build a blob from file content, computing its id from the framed bytes.
    pub fn from_content(content: &str) -> Self {
        Self::from_bytes_content(content.as_bytes().to_vec())
    }

    /// Build a blob from raw file bytes, computing its id from the framed bytes.
    pub fn from_bytes_content(data: Vec<u8>) -> Self {
        let id = ObjectHash::from_type_and_data(ObjectType::Blob, &data);
        Blob { id, data }
    }
}

impl ObjectTrait for Blob {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError>
    where
        Self: Sized,
    {
        Ok(Blob {
            id: hash,
            data: data.to_vec(),
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Blob
    }

    fn get_size(&self) -> usize {
        self.data.len()
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        Ok(self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{HashKind, set_hash_kind_for_test};

    #[test]
    fn from_content_sets_id() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let blob = Blob::from_content("hello");
        assert_eq!(blob.data, b"hello");
        assert_eq!(
            blob.id,
            ObjectHash::from_type_and_data(ObjectType::Blob, b"hello")
        );
    }

    #[test]
    fn from_bytes_preserves_given_hash() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let hash = ObjectHash::new(b"whatever");
        let blob = Blob::from_bytes(b"payload", hash).unwrap();
        assert_eq!(blob.id, hash);
        assert_eq!(blob.data, b"payload");
    }
}
