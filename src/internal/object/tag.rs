//! The Tag object is an annotated tag: a named, signed pointer at another
//! object (usually a commit), distinct from a lightweight tag ref which is
//! just a ref pointing directly at the object.

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;

use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::internal::object::ObjectTrait;
use crate::internal::object::signature::Signature;
use crate::internal::object::types::ObjectType;

#[derive(Eq, Debug, Clone)]
pub struct Tag {
    pub id: ObjectHash,
    pub object_hash: ObjectHash,
    pub object_type: ObjectType,
    pub tag_name: String,
    pub tagger: Signature,
    pub message: String,
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "object {}", self.object_hash)?;
        writeln!(f, "type {}", self.object_type)?;
        writeln!(f, "tag {}", self.tag_name)?;
        writeln!(f, "{}", self.tagger)?;
        writeln!(f)?;
        write!(f, "{}", self.message)
    }
}

impl Tag {
    pub fn new(
        object_hash: ObjectHash,
        object_type: ObjectType,
        tag_name: String,
        tagger: Signature,
        message: &str,
    ) -> Self {
        let mut tag = Tag {
            id: ObjectHash::default(),
            object_hash,
            object_type,
            tag_name,
            tagger,
            message: message.to_string(),
        };
        let data = tag.to_data().unwrap();
        tag.id = ObjectHash::from_type_and_data(ObjectType::Tag, &data);
        tag
    }
}

impl ObjectTrait for Tag {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError>
    where
        Self: Sized,
    {
        let mut rest = data;

        let object_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| GitError::InvalidTagObject("missing object line".to_string()))?;
        let object_hash = ObjectHash::from_str(
            rest[7..object_end] // "object " is 7 bytes
                .to_str()
                .map_err(|e| GitError::InvalidTagObject(e.to_string()))?,
        )
        .map_err(GitError::InvalidTagObject)?;
        rest = &rest[object_end + 1..];

        let type_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| GitError::InvalidTagObject("missing type line".to_string()))?;
        let object_type = ObjectType::from_string(
            rest[5..type_end] // "type " is 5 bytes
                .to_str()
                .map_err(|e| GitError::InvalidTagObject(e.to_string()))?,
        )?;
        rest = &rest[type_end + 1..];

        let tag_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| GitError::InvalidTagObject("missing tag line".to_string()))?;
        let tag_name = rest[4..tag_end] // "tag " is 4 bytes
            .to_str()
            .map_err(|e| GitError::InvalidTagObject(e.to_string()))?
            .to_string();
        rest = &rest[tag_end + 1..];

        let tagger_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| GitError::InvalidTagObject("missing tagger line".to_string()))?;
        let tagger = Signature::from_data(rest[..tagger_end].to_vec())
            .map_err(|e| GitError::InvalidTagObject(e.to_string()))?;
        rest = &rest[tagger_end + 1..];

        // skip the blank line separating headers from the message body
        if rest.first() == Some(&0x0a) {
            rest = &rest[1..];
        }
        let message = String::from_utf8(rest.to_vec())
            .map_err(|e| GitError::InvalidTagObject(e.to_string()))?;

        Ok(Tag {
            id: hash,
            object_hash,
            object_type,
            tag_name,
            tagger,
            message,
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Tag
    }

    fn get_size(&self) -> usize {
        0
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();
        data.extend(b"object ");
        data.extend(self.object_hash.to_string().as_bytes());
        data.push(0x0a);
        data.extend(b"type ");
        data.extend(self.object_type.to_string().as_bytes());
        data.push(0x0a);
        data.extend(b"tag ");
        data.extend(self.tag_name.as_bytes());
        data.push(0x0a);
        data.extend(self.tagger.to_data()?);
        data.push(0x0a);
        data.push(0x0a);
        data.extend(self.message.as_bytes());
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{HashKind, set_hash_kind_for_test};
    use crate::internal::object::signature::SignatureType;

    #[test]
    fn roundtrip_via_bytes() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let object_hash = ObjectHash::new(b"commit-payload");
        let tagger = Signature::new(
            SignatureType::Tagger,
            "releaser".to_string(),
            "releaser@example.com".to_string(),
        );
        let tag = Tag::new(
            object_hash,
            ObjectType::Commit,
            "v1.0.0".to_string(),
            tagger,
            "release v1.0.0\n",
        );

        let data = tag.to_data().unwrap();
        let parsed = Tag::from_bytes(&data, tag.id).unwrap();
        assert_eq!(parsed.object_hash, object_hash);
        assert_eq!(parsed.object_type, ObjectType::Commit);
        assert_eq!(parsed.tag_name, "v1.0.0");
        assert_eq!(parsed.message, "release v1.0.0\n");
    }
}
