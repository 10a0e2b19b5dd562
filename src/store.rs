//! Content-addressed object store: loose objects under `objects/<aa>/<bbb…>` plus a
//! process-local cache of objects found inside `objects/pack/*.pack`.

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use flate2::{Compression, read::ZlibDecoder, write::ZlibEncoder};
use tempfile::Builder;

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::object::{
        ObjectTrait, blob::Blob, commit::Commit, tag::Tag, tree::Tree, types::ObjectType,
    },
};

/// Loose-and-packed object store rooted at a repository's `objects/` directory.
///
/// Loose objects always shadow packed copies: `has`/`read_raw` check the loose path first
/// and only fall back to the pack cache on a miss.
pub struct ObjectStore {
    root: PathBuf,
    pack_cache: RwLock<Option<HashMap<ObjectHash, (ObjectType, Vec<u8>)>>>,
}

impl ObjectStore {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        ObjectStore {
            root: repo_root.into(),
            pack_cache: RwLock::new(None),
        }
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    pub fn pack_dir(&self) -> PathBuf {
        self.objects_dir().join("pack")
    }

    fn loose_path(&self, hash: &ObjectHash) -> PathBuf {
        let hex = hash.to_string();
        self.objects_dir().join(&hex[..2]).join(&hex[2..])
    }

    pub fn has(&self, hash: &ObjectHash) -> Result<bool, GitError> {
        if self.loose_path(hash).exists() {
            return Ok(true);
        }
        self.ensure_pack_cache()?;
        let cache = self.pack_cache.read().unwrap();
        Ok(cache.as_ref().unwrap().contains_key(hash))
    }

    /// Serialize, hash, compress, and atomically write an object. No-op if already present.
    pub fn write_object(&self, obj: &dyn ObjectTrait) -> Result<ObjectHash, GitError> {
        let data = obj.to_data()?;
        self.write_raw(obj.get_type(), &data, None)
    }

    /// Write raw object bytes, computing the hash unless `expected_hash` is supplied (the
    /// pack-import compatibility carve-out noted in §4.2).
    pub fn write_raw(
        &self,
        obj_type: ObjectType,
        bytes: &[u8],
        expected_hash: Option<ObjectHash>,
    ) -> Result<ObjectHash, GitError> {
        let hash = expected_hash.unwrap_or_else(|| ObjectHash::from_type_and_data(obj_type, bytes));
        let path = self.loose_path(&hash);
        if path.exists() {
            return Ok(hash);
        }

        let mut framed = Vec::with_capacity(bytes.len() + 16);
        framed.extend(obj_type.to_bytes()?);
        framed.push(b' ');
        framed.extend(bytes.len().to_string().as_bytes());
        framed.push(0);
        framed.extend(bytes);

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&framed)?;
        let compressed = encoder.finish()?;

        let parent = path.parent().expect("loose path always has a parent");
        fs::create_dir_all(parent)?;
        let mut tmp = Builder::new().prefix(".tmp-obj-").tempfile_in(parent)?;
        tmp.write_all(&compressed)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| GitError::IOError(e.error))?;

        Ok(hash)
    }

    /// Read an object's framed bytes back to `(type, payload)`, loose first then pack cache.
    pub fn read_raw(&self, hash: &ObjectHash) -> Result<(ObjectType, Vec<u8>), GitError> {
        let path = self.loose_path(hash);
        if let Ok(compressed) = fs::read(&path) {
            let mut decoder = ZlibDecoder::new(compressed.as_slice());
            let mut framed = Vec::new();
            decoder.read_to_end(&mut framed)?;
            return parse_framed(&framed);
        }

        self.ensure_pack_cache()?;
        let cache = self.pack_cache.read().unwrap();
        cache
            .as_ref()
            .unwrap()
            .get(hash)
            .cloned()
            .ok_or_else(|| GitError::object_not_found(*hash))
    }

    pub fn read_blob(&self, hash: &ObjectHash) -> Result<Blob, GitError> {
        let (t, data) = self.read_raw(hash)?;
        expect_type(t, ObjectType::Blob)?;
        Blob::from_bytes(&data, *hash)
    }

    pub fn read_tree(&self, hash: &ObjectHash) -> Result<Tree, GitError> {
        let (t, data) = self.read_raw(hash)?;
        expect_type(t, ObjectType::Tree)?;
        Tree::from_bytes(&data, *hash)
    }

    pub fn read_commit(&self, hash: &ObjectHash) -> Result<Commit, GitError> {
        let (t, data) = self.read_raw(hash)?;
        expect_type(t, ObjectType::Commit)?;
        Commit::from_bytes(&data, *hash)
    }

    pub fn read_tag(&self, hash: &ObjectHash) -> Result<Tag, GitError> {
        let (t, data) = self.read_raw(hash)?;
        expect_type(t, ObjectType::Tag)?;
        Tag::from_bytes(&data, *hash)
    }

    /// Enumerate loose object hashes (pack contents are not listed; GC only ever walks
    /// loose storage in this engine).
    pub fn iter_objects(&self) -> Result<Vec<ObjectHash>, GitError> {
        let mut hashes = Vec::new();
        let objects_dir = self.objects_dir();
        if !objects_dir.is_dir() {
            return Ok(hashes);
        }
        for prefix_entry in fs::read_dir(&objects_dir)? {
            let prefix_entry = prefix_entry?;
            let prefix_path = prefix_entry.path();
            let Some(prefix) = prefix_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if prefix.len() != 2 || prefix == "pack" {
                continue;
            }
            if !prefix_path.is_dir() {
                continue;
            }
            for suffix_entry in fs::read_dir(&prefix_path)? {
                let suffix_entry = suffix_entry?;
                if let Some(suffix) = suffix_entry.path().file_name().and_then(|n| n.to_str()) {
                    let hex = format!("{prefix}{suffix}");
                    if let Ok(hash) = hex.parse::<ObjectHash>() {
                        hashes.push(hash);
                    }
                }
            }
        }
        Ok(hashes)
    }

    /// Populate the pack cache from `objects/pack/*.pack` on first demand. Malformed packs
    /// are logged and skipped, never fatal.
    fn ensure_pack_cache(&self) -> Result<(), GitError> {
        {
            let guard = self.pack_cache.read().unwrap();
            if guard.is_some() {
                return Ok(());
            }
        }
        let mut guard = self.pack_cache.write().unwrap();
        if guard.is_some() {
            return Ok(());
        }

        let mut map = HashMap::new();
        let pack_dir = self.pack_dir();
        if pack_dir.is_dir() {
            for entry in fs::read_dir(&pack_dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("pack") {
                    continue;
                }
                if let Err(e) = load_pack_into(&path, &mut map) {
                    tracing::warn!("skipping unreadable pack {}: {e}", path.display());
                }
            }
        }
        *guard = Some(map);
        Ok(())
    }
}

fn load_pack_into(
    path: &Path,
    map: &mut HashMap<ObjectHash, (ObjectType, Vec<u8>)>,
) -> Result<(), GitError> {
    let mut file = fs::File::open(path)?;
    let mut pack = crate::internal::pack::Pack::new(None, None, None, true);
    pack.decode(&mut file, |_, _| {})?;
    for entry in pack.objects {
        map.insert(entry.hash, (entry.obj_type, entry.data));
    }
    Ok(())
}

fn expect_type(actual: ObjectType, expected: ObjectType) -> Result<(), GitError> {
    if actual.to_string() != expected.to_string() {
        return Err(GitError::type_mismatch(
            &expected.to_string(),
            &actual.to_string(),
        ));
    }
    Ok(())
}

fn parse_framed(framed: &[u8]) -> Result<(ObjectType, Vec<u8>), GitError> {
    let nul = framed
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| GitError::InvalidObjectType("loose object missing NUL terminator".into()))?;
    let header = std::str::from_utf8(&framed[..nul])
        .map_err(|e| GitError::InvalidObjectType(e.to_string()))?;
    let (type_str, size_str) = header
        .split_once(' ')
        .ok_or_else(|| GitError::InvalidObjectType(header.to_string()))?;
    let obj_type = ObjectType::from_string(type_str)?;
    let declared: usize = size_str
        .parse()
        .map_err(|_| GitError::InvalidObjectType(header.to_string()))?;
    let payload = framed[nul + 1..].to_vec();
    if payload.len() != declared {
        return Err(GitError::InvalidObjectType(format!(
            "size mismatch: header says {declared}, got {}",
            payload.len()
        )));
    }
    Ok((obj_type, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{HashKind, set_hash_kind_for_test};

    #[test]
    fn write_then_read_blob_roundtrips() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());

        let blob = Blob::from_content("hello store\n");
        let hash = store.write_object(&blob).unwrap();
        assert_eq!(hash, blob.id);
        assert!(store.has(&hash).unwrap());

        let read_back = store.read_blob(&hash).unwrap();
        assert_eq!(read_back.data, blob.data);
    }

    #[test]
    fn write_object_is_idempotent() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());

        let blob = Blob::from_content("same content");
        let hash1 = store.write_object(&blob).unwrap();
        let hash2 = store.write_object(&blob).unwrap();
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn missing_object_reports_not_found() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());

        let missing = ObjectHash::new(b"nothing stored under this hash");
        assert!(!store.has(&missing).unwrap());
        assert!(matches!(
            store.read_raw(&missing),
            Err(GitError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn reading_a_blob_as_a_tree_is_a_type_mismatch() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());

        let blob = Blob::from_content("not a tree");
        let hash = store.write_object(&blob).unwrap();
        assert!(matches!(
            store.read_tree(&hash),
            Err(GitError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn iter_objects_finds_every_loose_object() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());

        let a = store.write_object(&Blob::from_content("a")).unwrap();
        let b = store.write_object(&Blob::from_content("b")).unwrap();

        let mut found = store.iter_objects().unwrap();
        found.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(found, expected);
    }
}
