//! The Tree object is a flat listing of one directory's entries: each entry
//! pairs a file mode with a name and the hash of the blob or sub-tree it
//! points to.

use std::fmt::Display;

use bstr::ByteSlice;

use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::internal::object::ObjectTrait;
use crate::internal::object::types::ObjectType;

/// The Unix file mode recorded for a tree entry, restricted to the values Git
/// itself ever writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TreeItemMode {
    Blob,
    BlobExecutable,
    Link,
    Tree,
    Commit,
}

impl TreeItemMode {
    pub fn to_bytes(self) -> &'static [u8] {
        match self {
            TreeItemMode::Blob => b"100644",
            TreeItemMode::BlobExecutable => b"100755",
            TreeItemMode::Link => b"120000",
            TreeItemMode::Tree => b"40000",
            TreeItemMode::Commit => b"160000",
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GitError> {
        match bytes {
            b"100644" => Ok(TreeItemMode::Blob),
            b"100755" => Ok(TreeItemMode::BlobExecutable),
            b"120000" => Ok(TreeItemMode::Link),
            b"40000" | b"040000" => Ok(TreeItemMode::Tree),
            b"160000" => Ok(TreeItemMode::Commit),
            _ => Err(GitError::InvalidTreeItem(format!(
                "unsupported mode bytes: {:?}",
                String::from_utf8_lossy(bytes)
            ))),
        }
    }

    pub fn is_tree(self) -> bool {
        matches!(self, TreeItemMode::Tree)
    }
}

/// One entry in a tree: mode, target hash, and entry name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeItem {
    pub mode: TreeItemMode,
    pub id: ObjectHash,
    pub name: String,
}

impl TreeItem {
    pub fn new(mode: TreeItemMode, id: ObjectHash, name: String) -> Self {
        TreeItem { mode, id, name }
    }

    /// Sort key matching Git's canonical tree ordering: tree entries compare
    /// as if their name carried a trailing `/`, so `"foo"` (blob) sorts
    /// before `"foo.txt"` but after `"foo/"` (tree) would if both existed.
    fn sort_key(&self) -> String {
        if self.mode.is_tree() {
            format!("{}/", self.name)
        } else {
            self.name.clone()
        }
    }
}

#[derive(Eq, Debug, Clone)]
pub struct Tree {
    pub id: ObjectHash,
    pub tree_items: Vec<TreeItem>,
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for item in &self.tree_items {
            writeln!(
                f,
                "{:6} {} {}",
                String::from_utf8_lossy(item.mode.to_bytes()),
                item.id,
                item.name
            )?;
        }
        Ok(())
    }
}

impl Tree {
    /// Build a tree from entries in any order; sorts them into Git's
    /// canonical order before computing the id.
    pub fn from_tree_items(mut tree_items: Vec<TreeItem>) -> Result<Self, GitError> {
        tree_items.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        let mut tree = Tree {
            id: ObjectHash::default(),
            tree_items,
        };
        let data = tree.to_data()?;
        tree.id = ObjectHash::from_type_and_data(ObjectType::Tree, &data);
        Ok(tree)
    }
}

impl ObjectTrait for Tree {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError>
    where
        Self: Sized,
    {
        let mut tree_items = Vec::new();
        let mut rest = data;

        while !rest.is_empty() {
            let space = rest
                .find_byte(b' ')
                .ok_or_else(|| GitError::InvalidTreeObject("missing mode separator".to_string()))?;
            let mode = TreeItemMode::from_bytes(&rest[..space])?;

            let nul = rest
                .find_byte(0)
                .ok_or_else(|| GitError::InvalidTreeObject("missing name terminator".to_string()))?;
            let name = rest[space + 1..nul]
                .to_str()
                .map_err(|e| GitError::InvalidTreeObject(e.to_string()))?
                .to_string();

            let hash_size = hash.size();
            if rest.len() < nul + 1 + hash_size {
                return Err(GitError::InvalidTreeObject(
                    "truncated entry hash".to_string(),
                ));
            }
            let entry_hash = ObjectHash::from_bytes(&rest[nul + 1..nul + 1 + hash_size])
                .map_err(GitError::InvalidTreeObject)?;

            tree_items.push(TreeItem::new(mode, entry_hash, name));
            rest = &rest[nul + 1 + hash_size..];
        }

        Ok(Tree {
            id: hash,
            tree_items,
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn get_size(&self) -> usize {
        0
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();
        for item in &self.tree_items {
            data.extend(item.mode.to_bytes());
            data.push(b' ');
            data.extend(item.name.as_bytes());
            data.push(0);
            data.extend(item.id.as_ref());
        }
        Ok(data)
    }
}
