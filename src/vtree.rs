//! In-memory virtual tree: a nested path-addressed document store independent of any real
//! filesystem, plus a thin git-bridge (`checkout`/`commit`/`status`/`log`) that lets callers
//! treat a virtual tree as a lightweight working copy backed by the object store.

use std::collections::BTreeMap;

use crate::{
    errors::GitError,
    hash::ObjectHash,
    index::Status,
    internal::object::{
        ObjectTrait,
        commit::Commit,
        signature::Signature,
        tree::{Tree, TreeItem, TreeItemMode},
    },
    refs::RefStore,
    store::ObjectStore,
};

#[derive(Debug, Clone)]
pub enum VNode {
    File { data: Vec<u8>, executable: bool },
    Dir(BTreeMap<String, VNode>),
}

impl VNode {
    fn new_dir() -> Self {
        VNode::Dir(BTreeMap::new())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub is_dir: bool,
    pub size: usize,
    pub executable: bool,
}

#[derive(Debug, Clone)]
pub struct VirtualTree {
    root: VNode,
}

impl Default for VirtualTree {
    fn default() -> Self {
        VirtualTree { root: VNode::new_dir() }
    }
}

/// Split a virtual path into components, rejecting absolute paths, `..`-traversal, and
/// embedded NULs up front (§4.8's path-traversal safety invariant).
fn split(path: &str) -> Result<Vec<&str>, GitError> {
    if path.starts_with('/') || path.contains('\0') {
        return Err(GitError::InvalidPath(path.to_string()));
    }
    let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if components.iter().any(|c| *c == "..") {
        return Err(GitError::InvalidPath(path.to_string()));
    }
    Ok(components)
}

impl VirtualTree {
    pub fn new() -> Self {
        VirtualTree::default()
    }

    fn find<'a>(node: &'a VNode, components: &[&str]) -> Result<&'a VNode, GitError> {
        match components.split_first() {
            None => Ok(node),
            Some((head, rest)) => match node {
                VNode::Dir(children) => {
                    let child = children
                        .get(*head)
                        .ok_or_else(|| GitError::InvalidPath(components.join("/")))?;
                    Self::find(child, rest)
                }
                VNode::File { .. } => Err(GitError::PathKindConflict(
                    components.join("/"),
                    "file",
                    "directory",
                )),
            },
        }
    }

    fn find_mut<'a>(node: &'a mut VNode, components: &[&str]) -> Result<&'a mut VNode, GitError> {
        match components.split_first() {
            None => Ok(node),
            Some((head, rest)) => match node {
                VNode::Dir(children) => {
                    let child = children
                        .get_mut(*head)
                        .ok_or_else(|| GitError::InvalidPath(components.join("/")))?;
                    Self::find_mut(child, rest)
                }
                VNode::File { .. } => Err(GitError::PathKindConflict(
                    components.join("/"),
                    "file",
                    "directory",
                )),
            },
        }
    }

    /// Navigate to the parent directory of `components`, creating intermediate directories.
    fn ensure_parent<'a>(node: &'a mut VNode, components: &[&str]) -> Result<&'a mut VNode, GitError> {
        match components.split_first() {
            None => Ok(node),
            Some((head, rest)) => match node {
                VNode::Dir(children) => {
                    let child = children.entry(head.to_string()).or_insert_with(VNode::new_dir);
                    Self::ensure_parent(child, rest)
                }
                VNode::File { .. } => Err(GitError::PathKindConflict(
                    head.to_string(),
                    "file",
                    "directory",
                )),
            },
        }
    }

    pub fn read(&self, path: &str) -> Result<Vec<u8>, GitError> {
        match Self::find(&self.root, &split(path)?)? {
            VNode::File { data, .. } => Ok(data.clone()),
            VNode::Dir(_) => Err(GitError::PathKindConflict(path.to_string(), "directory", "file")),
        }
    }

    pub fn write(&mut self, path: &str, data: Vec<u8>) -> Result<(), GitError> {
        let components = split(path)?;
        let (name, parent_components) = components
            .split_last()
            .ok_or_else(|| GitError::InvalidPath(path.to_string()))?;
        let parent = Self::ensure_parent(&mut self.root, parent_components)?;
        match parent {
            VNode::Dir(children) => {
                if matches!(children.get(*name), Some(VNode::Dir(_))) {
                    return Err(GitError::PathKindConflict(path.to_string(), "directory", "file"));
                }
                children.insert(name.to_string(), VNode::File { data, executable: false });
                Ok(())
            }
            VNode::File { .. } => unreachable!("ensure_parent never returns a file node"),
        }
    }

    pub fn append(&mut self, path: &str, data: &[u8]) -> Result<(), GitError> {
        let existing = self.read(path).unwrap_or_default();
        let mut combined = existing;
        combined.extend_from_slice(data);
        self.write(path, combined)
    }

    pub fn delete(&mut self, path: &str) -> Result<(), GitError> {
        let components = split(path)?;
        let (name, parent_components) = components
            .split_last()
            .ok_or_else(|| GitError::InvalidPath(path.to_string()))?;
        let parent = Self::find_mut(&mut self.root, parent_components)?;
        match parent {
            VNode::Dir(children) => children
                .remove(*name)
                .map(|_| ())
                .ok_or_else(|| GitError::InvalidPath(path.to_string())),
            VNode::File { .. } => Err(GitError::InvalidPath(path.to_string())),
        }
    }

    pub fn mkdir(&mut self, path: &str) -> Result<(), GitError> {
        Self::ensure_parent(&mut self.root, &split(path)?)?;
        Ok(())
    }

    pub fn rmdir(&mut self, path: &str) -> Result<(), GitError> {
        self.delete(path)
    }

    pub fn list(&self, path: &str) -> Result<Vec<String>, GitError> {
        match Self::find(&self.root, &split(path)?)? {
            VNode::Dir(children) => Ok(children.keys().cloned().collect()),
            VNode::File { .. } => Err(GitError::PathKindConflict(path.to_string(), "file", "directory")),
        }
    }

    pub fn list_recursive(&self, path: &str) -> Result<Vec<String>, GitError> {
        let node = Self::find(&self.root, &split(path)?)?;
        let mut out = Vec::new();
        collect_files(node, "", &mut out);
        Ok(out)
    }

    pub fn copy(&mut self, src: &str, dst: &str) -> Result<(), GitError> {
        let node = Self::find(&self.root, &split(src)?)?.clone();
        self.import(dst, node)
    }

    pub fn mv(&mut self, src: &str, dst: &str) -> Result<(), GitError> {
        self.copy(src, dst)?;
        self.delete(src)
    }

    pub fn stat(&self, path: &str) -> Result<Stat, GitError> {
        match Self::find(&self.root, &split(path)?)? {
            VNode::File { data, executable } => Ok(Stat {
                is_dir: false,
                size: data.len(),
                executable: *executable,
            }),
            VNode::Dir(children) => Ok(Stat {
                is_dir: true,
                size: children.len(),
                executable: false,
            }),
        }
    }

    pub fn export(&self, path: &str) -> Result<VNode, GitError> {
        Self::find(&self.root, &split(path)?).cloned()
    }

    pub fn import(&mut self, path: &str, node: VNode) -> Result<(), GitError> {
        let components = split(path)?;
        let (name, parent_components) = components
            .split_last()
            .ok_or_else(|| GitError::InvalidPath(path.to_string()))?;
        let parent = Self::ensure_parent(&mut self.root, parent_components)?;
        match parent {
            VNode::Dir(children) => {
                if let Some(existing) = children.get(*name) {
                    let kind_conflict = match (existing, &node) {
                        (VNode::Dir(_), VNode::File { .. }) => Some(("directory", "file")),
                        (VNode::File { .. }, VNode::Dir(_)) => Some(("file", "directory")),
                        _ => None,
                    };
                    if let Some((existing_kind, new_kind)) = kind_conflict {
                        return Err(GitError::PathKindConflict(path.to_string(), existing_kind, new_kind));
                    }
                }
                children.insert(name.to_string(), node);
                Ok(())
            }
            VNode::File { .. } => unreachable!("ensure_parent never returns a file node"),
        }
    }

    // ---- git bridge ----

    /// Replace the whole virtual tree with the contents of a committed tree.
    pub fn checkout(&mut self, store: &ObjectStore, tree_hash: &ObjectHash) -> Result<(), GitError> {
        self.root = tree_to_vnode(store, tree_hash)?;
        Ok(())
    }

    /// Snapshot the virtual tree into a commit. `parents` follows the rule: the base commit if
    /// one was supplied, else the branch's current HEAD if it has one, else no parents (the
    /// branch's first commit).
    #[allow(clippy::too_many_arguments)]
    pub fn commit(
        &self,
        store: &ObjectStore,
        refs: &RefStore,
        branch_ref: &str,
        base_commit_hash: Option<ObjectHash>,
        author: Signature,
        committer: Signature,
        message: &str,
    ) -> Result<ObjectHash, GitError> {
        let tree_hash = vnode_to_tree(store, &self.root)?;
        let parents = match base_commit_hash {
            Some(hash) => vec![hash],
            None => match refs.read_ref(branch_ref) {
                Ok(hash) => vec![hash],
                Err(GitError::RefNotFound(_)) => Vec::new(),
                Err(e) => return Err(e),
            },
        };
        let commit = Commit::new(author, committer, tree_hash, parents, message);
        let hash = store.write_object(&commit)?;
        refs.update_ref(branch_ref, hash)?;
        Ok(hash)
    }

    /// Compare the virtual tree against a committed tree, reusing the index-status shape.
    pub fn status(&self, store: &ObjectStore, head_tree: Option<&ObjectHash>) -> Result<Status, GitError> {
        let mut status = Status::default();
        let head_entries = match head_tree {
            Some(hash) => flatten_committed(store, hash, "")?,
            None => BTreeMap::new(),
        };
        let mut current = BTreeMap::new();
        collect_entries(&self.root, "", &mut current);

        for (path, (data, _)) in &current {
            match head_entries.get(path) {
                None => status.staged_new.push(path.clone()),
                Some(head_hash) => {
                    let current_hash = ObjectHash::from_type_and_data(
                        crate::internal::object::types::ObjectType::Blob,
                        data,
                    );
                    if current_hash != *head_hash {
                        status.staged_modified.push(path.clone());
                    }
                }
            }
        }
        for path in head_entries.keys() {
            if !current.contains_key(path) {
                status.staged_deleted.push(path.clone());
            }
        }
        Ok(status)
    }

    /// Walk first-parent history starting at `start`, most recent first.
    pub fn log(&self, store: &ObjectStore, start: &ObjectHash) -> Result<Vec<Commit>, GitError> {
        let mut history = Vec::new();
        let mut current = Some(*start);
        while let Some(hash) = current {
            let commit = store.read_commit(&hash)?;
            current = commit.parent_commit_ids.first().copied();
            history.push(commit);
        }
        Ok(history)
    }
}

fn collect_files(node: &VNode, prefix: &str, out: &mut Vec<String>) {
    match node {
        VNode::File { .. } => out.push(prefix.trim_start_matches('/').to_string()),
        VNode::Dir(children) => {
            for (name, child) in children {
                let path = format!("{prefix}/{name}");
                collect_files(child, &path, out);
            }
        }
    }
}

fn collect_entries(node: &VNode, prefix: &str, out: &mut BTreeMap<String, (Vec<u8>, bool)>) {
    match node {
        VNode::File { data, executable } => {
            out.insert(prefix.trim_start_matches('/').to_string(), (data.clone(), *executable));
        }
        VNode::Dir(children) => {
            for (name, child) in children {
                let path = format!("{prefix}/{name}");
                collect_entries(child, &path, out);
            }
        }
    }
}

fn flatten_committed(
    store: &ObjectStore,
    tree_hash: &ObjectHash,
    prefix: &str,
) -> Result<BTreeMap<String, ObjectHash>, GitError> {
    let tree = store.read_tree(tree_hash)?;
    let mut out = BTreeMap::new();
    for item in &tree.tree_items {
        let path = if prefix.is_empty() {
            item.name.clone()
        } else {
            format!("{prefix}/{}", item.name)
        };
        if item.mode.is_tree() {
            out.extend(flatten_committed(store, &item.id, &path)?);
        } else {
            out.insert(path, item.id);
        }
    }
    Ok(out)
}

fn tree_to_vnode(store: &ObjectStore, tree_hash: &ObjectHash) -> Result<VNode, GitError> {
    let tree = store.read_tree(tree_hash)?;
    let mut children = BTreeMap::new();
    for item in &tree.tree_items {
        let node = if item.mode.is_tree() {
            tree_to_vnode(store, &item.id)?
        } else {
            let blob = store.read_blob(&item.id)?;
            VNode::File {
                data: blob.data,
                executable: matches!(item.mode, TreeItemMode::BlobExecutable),
            }
        };
        children.insert(item.name.clone(), node);
    }
    Ok(VNode::Dir(children))
}

fn vnode_to_tree(store: &ObjectStore, node: &VNode) -> Result<ObjectHash, GitError> {
    match node {
        VNode::File { .. } => Err(GitError::InvalidPath(
            "commit root must be a directory".to_string(),
        )),
        VNode::Dir(children) => {
            let mut items = Vec::new();
            for (name, child) in children {
                match child {
                    VNode::File { data, executable } => {
                        let blob = crate::internal::object::blob::Blob::from_bytes_content(data.clone());
                        let hash = store.write_object(&blob)?;
                        let mode = if *executable {
                            TreeItemMode::BlobExecutable
                        } else {
                            TreeItemMode::Blob
                        };
                        items.push(TreeItem::new(mode, hash, name.clone()));
                    }
                    VNode::Dir(_) => {
                        let hash = vnode_to_tree(store, child)?;
                        items.push(TreeItem::new(TreeItemMode::Tree, hash, name.clone()));
                    }
                }
            }
            let tree = Tree::from_tree_items(items)?;
            store.write_object(&tree)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{HashKind, set_hash_kind_for_test};

    #[test]
    fn write_read_and_list() {
        let mut vt = VirtualTree::new();
        vt.write("a/b/c.txt", b"hello".to_vec()).unwrap();
        assert_eq!(vt.read("a/b/c.txt").unwrap(), b"hello");
        assert_eq!(vt.list("a/b").unwrap(), vec!["c.txt".to_string()]);
    }

    #[test]
    fn append_extends_existing_file() {
        let mut vt = VirtualTree::new();
        vt.write("note.txt", b"one".to_vec()).unwrap();
        vt.append("note.txt", b"two").unwrap();
        assert_eq!(vt.read("note.txt").unwrap(), b"onetwo");
    }

    #[test]
    fn move_relocates_and_removes_source() {
        let mut vt = VirtualTree::new();
        vt.write("src.txt", b"data".to_vec()).unwrap();
        vt.mv("src.txt", "dst.txt").unwrap();
        assert!(vt.read("src.txt").is_err());
        assert_eq!(vt.read("dst.txt").unwrap(), b"data");
    }

    #[test]
    fn write_rejects_traversal_and_absolute_paths() {
        let mut vt = VirtualTree::new();
        assert!(matches!(vt.write("../escape.txt", b"x".to_vec()), Err(GitError::InvalidPath(_))));
        assert!(matches!(vt.write("/etc/passwd", b"x".to_vec()), Err(GitError::InvalidPath(_))));
        assert!(matches!(vt.write("a/../../b", b"x".to_vec()), Err(GitError::InvalidPath(_))));
    }

    #[test]
    fn writing_through_a_file_component_conflicts() {
        let mut vt = VirtualTree::new();
        vt.write("a", b"file content".to_vec()).unwrap();
        assert!(matches!(
            vt.write("a/b", b"x".to_vec()),
            Err(GitError::PathKindConflict(..))
        ));
    }

    #[test]
    fn writing_a_file_over_an_existing_directory_conflicts() {
        let mut vt = VirtualTree::new();
        vt.write("a/b", b"x".to_vec()).unwrap();
        assert!(matches!(
            vt.write("a", b"file content".to_vec()),
            Err(GitError::PathKindConflict(..))
        ));
        // the directory and its child must be untouched after the rejected write.
        assert_eq!(vt.read("a/b").unwrap(), b"x");
    }

    #[test]
    fn importing_a_file_over_an_existing_directory_conflicts() {
        let mut vt = VirtualTree::new();
        vt.write("a/b", b"x".to_vec()).unwrap();
        let file_node = vt.export("a/b").unwrap();
        assert!(matches!(vt.import("a", file_node), Err(GitError::PathKindConflict(..))));
    }

    #[test]
    fn commit_with_no_parent_on_unborn_branch() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let refs = RefStore::new(dir.path());

        let mut vt = VirtualTree::new();
        vt.write("readme.txt", b"hello world".to_vec()).unwrap();

        let author = Signature::new(
            crate::internal::object::signature::SignatureType::Author,
            "tester".to_string(),
            "tester@example.com".to_string(),
        );
        let committer = author.clone();
        let hash = vt
            .commit(&store, &refs, "refs/heads/main", None, author, committer, "initial")
            .unwrap();

        let commit = store.read_commit(&hash).unwrap();
        assert!(commit.parent_commit_ids.is_empty());
        assert_eq!(refs.read_ref("refs/heads/main").unwrap(), hash);
    }

    #[test]
    fn commit_chains_onto_existing_branch_head() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let refs = RefStore::new(dir.path());

        let author = Signature::new(
            crate::internal::object::signature::SignatureType::Author,
            "tester".to_string(),
            "tester@example.com".to_string(),
        );

        let mut vt = VirtualTree::new();
        vt.write("a.txt", b"v1".to_vec()).unwrap();
        let first = vt
            .commit(&store, &refs, "refs/heads/main", None, author.clone(), author.clone(), "first")
            .unwrap();

        vt.write("a.txt", b"v2".to_vec()).unwrap();
        let second = vt
            .commit(&store, &refs, "refs/heads/main", None, author.clone(), author, "second")
            .unwrap();

        let second_commit = store.read_commit(&second).unwrap();
        assert_eq!(second_commit.parent_commit_ids, vec![first]);
    }

    #[test]
    fn log_walks_first_parent_chain() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let refs = RefStore::new(dir.path());
        let author = Signature::new(
            crate::internal::object::signature::SignatureType::Author,
            "tester".to_string(),
            "tester@example.com".to_string(),
        );

        let mut vt = VirtualTree::new();
        vt.write("a.txt", b"v1".to_vec()).unwrap();
        vt.commit(&store, &refs, "refs/heads/main", None, author.clone(), author.clone(), "first").unwrap();
        vt.write("a.txt", b"v2".to_vec()).unwrap();
        let second = vt.commit(&store, &refs, "refs/heads/main", None, author.clone(), author, "second").unwrap();

        let history = vt.log(&store, &second).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message, "second");
        assert_eq!(history[1].message, "first");
    }
}
