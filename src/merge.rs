//! Three-way merge: common-ancestor discovery, fast-forward detection, and tree-level merge
//! with conflict markers for paths both sides touched in incompatible ways.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::{
    errors::GitError,
    hash::ObjectHash,
    index::flatten_tree,
    internal::object::{
        blob::Blob,
        commit::Commit,
        signature::Signature,
        tree::{Tree, TreeItem, TreeItemMode},
    },
    refs::RefStore,
    store::ObjectStore,
};

pub const CONFLICT_MARKER_OURS: &str = "<<<<<<< ours";
pub const CONFLICT_MARKER_SEPARATOR: &str = "=======";
pub const CONFLICT_MARKER_THEIRS: &str = ">>>>>>> theirs";

/// Outcome of merging another commit into the commit a branch currently points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// `their_commit` was already an ancestor of the branch; nothing to do.
    AlreadyUpToDate,
    /// Base equalled the branch tip; the branch was advanced with no tree rewrite.
    FastForward(ObjectHash),
    /// A new merge commit with two parents was created and the branch was advanced to it.
    Merged(ObjectHash),
}

/// Result of merging two trees against their common base: the merged tree plus any paths
/// that needed a conflict marker.
#[derive(Debug, Clone)]
pub struct TreeMergeResult {
    pub tree_hash: ObjectHash,
    pub conflicts: Vec<String>,
}

/// Lowest common ancestor of two commit histories: BFS over parent pointers from both sides.
/// Among commits reachable from both, the one with the smallest combined BFS depth wins
/// (closest to both tips); ties break on commit timestamp (most recent wins), and any
/// remaining tie falls back to BFS discovery order.
pub fn merge_base(
    store: &ObjectStore,
    a: ObjectHash,
    b: ObjectHash,
) -> Result<Option<ObjectHash>, GitError> {
    if a == b {
        return Ok(Some(a));
    }
    let depths_a = ancestor_depths(store, a)?;
    let depths_b = ancestor_depths(store, b)?;

    let mut candidates = Vec::new();
    for (hash, depth_a) in &depths_a {
        if let Some(depth_b) = depths_b.get(hash) {
            let commit = store.read_commit(hash)?;
            candidates.push((depth_a + depth_b, commit.author.timestamp, *hash));
        }
    }
    if candidates.is_empty() {
        return Ok(None);
    }
    candidates.sort_by(|x, y| x.0.cmp(&y.0).then(y.1.cmp(&x.1)));
    Ok(Some(candidates[0].2))
}

/// BFS distance from `start` to every ancestor reachable through parent pointers.
fn ancestor_depths(
    store: &ObjectStore,
    start: ObjectHash,
) -> Result<BTreeMap<ObjectHash, usize>, GitError> {
    let mut depths = BTreeMap::new();
    let mut queue = VecDeque::new();
    depths.insert(start, 0usize);
    queue.push_back(start);
    while let Some(hash) = queue.pop_front() {
        let depth = depths[&hash];
        let commit = store.read_commit(&hash)?;
        for parent in &commit.parent_commit_ids {
            if !depths.contains_key(parent) {
                depths.insert(*parent, depth + 1);
                queue.push_back(*parent);
            }
        }
    }
    Ok(depths)
}

/// Merge `their_commit` into the commit `branch_ref` currently resolves to, advancing the
/// ref on a clean result. A conflicting merge leaves the ref untouched; the caller is handed
/// back the conflicting paths and may inspect the markers via the merged tree that would
/// have been produced by calling [`merge_trees`] directly if it needs to materialize them.
pub fn merge(
    store: &ObjectStore,
    refs: &RefStore,
    branch_ref: &str,
    their_commit: ObjectHash,
    author: Signature,
    committer: Signature,
    message: &str,
) -> Result<MergeOutcome, GitError> {
    let our_commit = refs.read_ref(branch_ref)?;
    if our_commit == their_commit {
        return Ok(MergeOutcome::AlreadyUpToDate);
    }

    let base = merge_base(store, our_commit, their_commit)?;
    if base == Some(their_commit) {
        return Ok(MergeOutcome::AlreadyUpToDate);
    }
    if base == Some(our_commit) {
        refs.update_ref(branch_ref, their_commit)?;
        return Ok(MergeOutcome::FastForward(their_commit));
    }

    let ours = store.read_commit(&our_commit)?;
    let theirs = store.read_commit(&their_commit)?;
    let base_tree = match base {
        Some(hash) => Some(store.read_commit(&hash)?.tree_id),
        None => None,
    };

    let result = merge_trees(store, base_tree.as_ref(), &ours.tree_id, &theirs.tree_id)?;
    if !result.conflicts.is_empty() {
        return Err(GitError::MergeConflict { paths: result.conflicts });
    }

    let merge_commit = Commit::new(
        author,
        committer,
        result.tree_hash,
        vec![our_commit, their_commit],
        message,
    );
    store.write_object(&merge_commit)?;
    refs.update_ref(branch_ref, merge_commit.id)?;
    Ok(MergeOutcome::Merged(merge_commit.id))
}

/// Three-way merge at path granularity. For every path touched on either side of `base`:
/// unchanged-on-one-side paths take the other side's version; paths changed identically on
/// both sides take that version; paths changed differently on both sides get a content-level
/// conflict marker when both sides still have a blob there, otherwise the path is reported
/// as conflicting and our side is kept.
pub fn merge_trees(
    store: &ObjectStore,
    base_tree: Option<&ObjectHash>,
    ours_tree: &ObjectHash,
    theirs_tree: &ObjectHash,
) -> Result<TreeMergeResult, GitError> {
    let base_entries = match base_tree {
        Some(hash) => flatten_tree(store, hash, "")?,
        None => BTreeMap::new(),
    };
    let ours_entries = flatten_tree(store, ours_tree, "")?;
    let theirs_entries = flatten_tree(store, theirs_tree, "")?;

    let mut all_paths: BTreeSet<String> = BTreeSet::new();
    all_paths.extend(base_entries.keys().cloned());
    all_paths.extend(ours_entries.keys().cloned());
    all_paths.extend(theirs_entries.keys().cloned());

    let mut merged: BTreeMap<String, (TreeItemMode, ObjectHash)> = BTreeMap::new();
    let mut conflicts = Vec::new();

    for path in all_paths {
        let base_entry = base_entries.get(&path).copied();
        let ours_entry = ours_entries.get(&path).copied();
        let theirs_entry = theirs_entries.get(&path).copied();

        if ours_entry == theirs_entry {
            if let Some(entry) = ours_entry {
                merged.insert(path, entry);
            }
            continue;
        }
        if ours_entry == base_entry {
            if let Some(entry) = theirs_entry {
                merged.insert(path, entry);
            }
            continue;
        }
        if theirs_entry == base_entry {
            if let Some(entry) = ours_entry {
                merged.insert(path, entry);
            }
            continue;
        }

        match (ours_entry, theirs_entry) {
            (Some((ours_mode, ours_hash)), Some((_, theirs_hash))) if !ours_mode.is_tree() => {
                let ours_blob = store.read_blob(&ours_hash)?;
                let theirs_blob = store.read_blob(&theirs_hash)?;
                let marked = conflict_blob(&ours_blob.data, &theirs_blob.data);
                let blob = Blob::from_bytes_content(marked);
                let hash = store.write_object(&blob)?;
                merged.insert(path.clone(), (ours_mode, hash));
                conflicts.push(path);
            }
            _ => {
                if let Some(entry) = ours_entry.or(theirs_entry) {
                    merged.insert(path.clone(), entry);
                }
                conflicts.push(path);
            }
        }
    }

    let tree_hash = write_flat_tree(store, &merged)?;
    Ok(TreeMergeResult { tree_hash, conflicts })
}

fn conflict_blob(ours: &[u8], theirs: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ours.len() + theirs.len() + 32);
    out.extend_from_slice(CONFLICT_MARKER_OURS.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(ours);
    if !ours.ends_with(b"\n") {
        out.push(b'\n');
    }
    out.extend_from_slice(CONFLICT_MARKER_SEPARATOR.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(theirs);
    if !theirs.ends_with(b"\n") {
        out.push(b'\n');
    }
    out.extend_from_slice(CONFLICT_MARKER_THEIRS.as_bytes());
    out.push(b'\n');
    out
}

/// Rebuild a nested tree from a flat `path -> (mode, hash)` map, mirroring the index's own
/// flattening helper in reverse.
#[derive(Default)]
struct DirNode {
    blobs: BTreeMap<String, (TreeItemMode, ObjectHash)>,
    dirs: BTreeMap<String, DirNode>,
}

impl DirNode {
    fn insert(&mut self, path: &str, mode: TreeItemMode, hash: ObjectHash) {
        match path.split_once('/') {
            None => {
                self.blobs.insert(path.to_string(), (mode, hash));
            }
            Some((first, rest)) => {
                self.dirs.entry(first.to_string()).or_default().insert(rest, mode, hash);
            }
        }
    }

    fn write(&self, store: &ObjectStore) -> Result<ObjectHash, GitError> {
        let mut items = Vec::new();
        for (name, (mode, hash)) in &self.blobs {
            items.push(TreeItem::new(*mode, *hash, name.clone()));
        }
        for (name, dir) in &self.dirs {
            let hash = dir.write(store)?;
            items.push(TreeItem::new(TreeItemMode::Tree, hash, name.clone()));
        }
        let tree = Tree::from_tree_items(items)?;
        store.write_object(&tree)
    }
}

fn write_flat_tree(
    store: &ObjectStore,
    entries: &BTreeMap<String, (TreeItemMode, ObjectHash)>,
) -> Result<ObjectHash, GitError> {
    let mut root = DirNode::default();
    for (path, (mode, hash)) in entries {
        root.insert(path, *mode, *hash);
    }
    root.write(store)
}
