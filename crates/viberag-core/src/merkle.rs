//! Content-addressed hierarchical Merkle tree (spec §4.4).
//!
//! Unlike a flat path→hash map, the tree mirrors the directory structure:
//! a directory's hash is a pure function of its children's (name, hash)
//! pairs, so an unchanged subtree's hash never needs recomputing and
//! `compare` can short-circuit at the first matching directory hash.

use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::error::Result;
use crate::hash::{hash_file, is_binary};
use crate::ignore_engine::IgnoreEngine;

/// One node of the tree: either a file (leaf) or a directory (interior).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MerkleNode {
    File {
        hash: String,
        size: u64,
        mtime_secs: i64,
    },
    Directory {
        hash: String,
        children: BTreeMap<String, MerkleNode>,
    },
}

impl MerkleNode {
    pub fn hash(&self) -> &str {
        match self {
            MerkleNode::File { hash, .. } => hash,
            MerkleNode::Directory { hash, .. } => hash,
        }
    }

    fn directory_hash(children: &BTreeMap<String, MerkleNode>) -> String {
        // BTreeMap iterates already sorted lexicographically by key.
        let mut hasher = Sha256::new();
        for (name, node) in children {
            hasher.update(name.as_bytes());
            hasher.update(b":");
            hasher.update(node.hash().as_bytes());
            hasher.update(b"\n");
        }
        encode_hex(&hasher.finalize())
    }
}

/// The whole tree, rooted at the project root. Root itself is always a
/// `Directory` node so an empty project has a well-defined hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleTree {
    pub root: MerkleNode,
}

impl MerkleTree {
    pub fn root_hash(&self) -> &str {
        self.root.hash()
    }

    /// The tree of an empty project: a well-defined root hash with no children.
    pub fn empty() -> Self {
        Self {
            root: MerkleNode::Directory {
                hash: MerkleNode::directory_hash(&BTreeMap::new()),
                children: BTreeMap::new(),
            },
        }
    }

    /// Compare against another tree, short-circuiting at matching directory
    /// hashes. `O(changed subtree)`, not `O(repository)`.
    pub fn compare(&self, current: &MerkleTree) -> Diff {
        compare(self, current)
    }

    /// Flatten the tree into `relative_path -> file hash` for file leaves
    /// only, used by the indexer to enumerate files to chunk.
    pub fn file_hashes(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        collect_files(&self.root, &mut PathBuf::new(), &mut out);
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

fn collect_files(node: &MerkleNode, prefix: &mut PathBuf, out: &mut BTreeMap<String, String>) {
    match node {
        MerkleNode::File { hash, .. } => {
            out.insert(prefix.to_string_lossy().replace('\\', "/"), hash.clone());
        }
        MerkleNode::Directory { children, .. } => {
            for (name, child) in children {
                prefix.push(name);
                collect_files(child, prefix, out);
                prefix.pop();
            }
        }
    }
}

/// Stats emitted by a single `build` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildStats {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub files_reused_from_cache: usize,
    pub files_rehashed: usize,
}

/// The result of comparing two trees.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diff {
    pub new: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl Diff {
    pub fn has_changes(&self) -> bool {
        !self.new.is_empty() || !self.modified.is_empty() || !self.deleted.is_empty()
    }
}

/// Walks a project root (honoring §4.2's ignore engine and an extension
/// allowlist) and builds a content-addressed [`MerkleTree`].
pub struct MerkleBuilder<'a> {
    ignore: &'a IgnoreEngine,
    extensions: &'a [String],
}

impl<'a> MerkleBuilder<'a> {
    pub fn new(ignore: &'a IgnoreEngine, extensions: &'a [String]) -> Self {
        Self { ignore, extensions }
    }

    /// Build a new tree, reusing `previous`'s file hashes whenever a
    /// file's `(size, mtime)` matches exactly (mtime cache).
    pub fn build(&self, project_root: &Path, previous: Option<&MerkleTree>) -> Result<(MerkleTree, BuildStats)> {
        let mut stats = BuildStats::default();
        let prev_files = previous.map(|t| t.file_hashes()).unwrap_or_default();
        let prev_meta = previous.map(|t| collect_file_meta(&t.root)).unwrap_or_default();

        let entries = self.walk(project_root)?;
        stats.files_scanned = entries.len();

        // Hash files in parallel (rayon), reusing cached hashes where possible.
        let hashed: Vec<Option<(String, FileLeaf)>> = entries
            .par_iter()
            .map(|rel_path| self.hash_one(project_root, rel_path, &prev_meta, &prev_files))
            .collect();

        let mut tree: BTreeMap<String, MerkleNode> = BTreeMap::new();
        for (rel_path, outcome) in entries.iter().zip(hashed.into_iter()) {
            match outcome {
                Some((hash, leaf)) => {
                    if leaf.reused {
                        stats.files_reused_from_cache += 1;
                    } else {
                        stats.files_rehashed += 1;
                    }
                    insert_file(&mut tree, rel_path, hash, leaf.size, leaf.mtime_secs);
                }
                None => {
                    stats.files_skipped += 1;
                    debug!("skipped {}", rel_path);
                }
            }
        }

        let root = build_directory_node(tree);
        Ok((MerkleTree { root }, stats))
    }

    fn hash_one(
        &self,
        project_root: &Path,
        rel_path: &str,
        prev_meta: &BTreeMap<String, (u64, i64)>,
        prev_files: &BTreeMap<String, String>,
    ) -> Option<(String, FileLeaf)> {
        let abs_path = project_root.join(rel_path);
        let metadata = std::fs::metadata(&abs_path).ok()?;
        if !metadata.is_file() {
            return None;
        }

        if is_binary(&abs_path).unwrap_or(true) {
            return None;
        }

        let size = metadata.len();
        let mtime_secs = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        if let Some((prev_size, prev_mtime)) = prev_meta.get(rel_path) {
            if *prev_size == size && *prev_mtime == mtime_secs {
                if let Some(hash) = prev_files.get(rel_path) {
                    return Some((
                        hash.clone(),
                        FileLeaf {
                            size,
                            mtime_secs,
                            reused: true,
                        },
                    ));
                }
            }
        }

        match hash_file(&abs_path) {
            Ok(hash) => Some((
                hash,
                FileLeaf {
                    size,
                    mtime_secs,
                    reused: false,
                },
            )),
            Err(e) => {
                warn!("failed to hash {}: {}", rel_path, e);
                None
            }
        }
    }

    fn walk(&self, project_root: &Path) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let upfront_excludes = self.ignore.upfront_dir_excludes();

        let walker = WalkBuilder::new(project_root)
            .follow_links(false)
            .hidden(false)
            .git_ignore(false) // we apply our own IgnoreEngine instead
            .git_global(false)
            .git_exclude(false)
            .filter_entry(move |entry| {
                if let Some(name) = entry.file_name().to_str() {
                    !upfront_excludes.iter().any(|x| x == name)
                } else {
                    true
                }
            })
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("walk error: {}", e);
                    continue;
                }
            };

            let file_type = match entry.file_type() {
                Some(ft) => ft,
                None => continue,
            };
            if !file_type.is_file() || file_type.is_symlink() {
                continue;
            }

            let rel_path = entry
                .path()
                .strip_prefix(project_root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");

            if self.ignore.ignored(Path::new(&rel_path)) {
                continue;
            }

            if !self.extensions.is_empty() {
                let ext_ok = Path::new(&rel_path)
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| self.extensions.iter().any(|allowed| allowed == e))
                    .unwrap_or(false);
                if !ext_ok {
                    continue;
                }
            }

            out.push(rel_path);
        }

        Ok(out)
    }
}

struct FileLeaf {
    size: u64,
    mtime_secs: i64,
    reused: bool,
}

fn insert_file(tree: &mut BTreeMap<String, MerkleNode>, rel_path: &str, hash: String, size: u64, mtime_secs: i64) {
    let components: Vec<&str> = rel_path.split('/').collect();
    insert_recursive(tree, &components, hash, size, mtime_secs);
}

fn insert_recursive(
    level: &mut BTreeMap<String, MerkleNode>,
    components: &[&str],
    hash: String,
    size: u64,
    mtime_secs: i64,
) {
    match components {
        [] => {}
        [only] => {
            level.insert(
                (*only).to_string(),
                MerkleNode::File {
                    hash,
                    size,
                    mtime_secs,
                },
            );
        }
        [head, tail @ ..] => {
            let entry = level
                .entry((*head).to_string())
                .or_insert_with(|| MerkleNode::Directory {
                    hash: String::new(),
                    children: BTreeMap::new(),
                });
            if let MerkleNode::Directory { children, .. } = entry {
                insert_recursive(children, tail, hash, size, mtime_secs);
            }
        }
    }
}

/// Recursively compute every directory's hash bottom-up.
fn build_directory_node(mut children: BTreeMap<String, MerkleNode>) -> MerkleNode {
    for node in children.values_mut() {
        if let MerkleNode::Directory {
            children: sub_children,
            hash,
        } = node
        {
            let resolved = build_directory_node(std::mem::take(sub_children));
            if let MerkleNode::Directory {
                children: new_children,
                hash: new_hash,
            } = resolved
            {
                *sub_children = new_children;
                *hash = new_hash;
            }
        }
    }
    let hash = MerkleNode::directory_hash(&children);
    MerkleNode::Directory { hash, children }
}

fn collect_file_meta(node: &MerkleNode) -> BTreeMap<String, (u64, i64)> {
    let mut out = BTreeMap::new();
    fn walk(node: &MerkleNode, prefix: &mut PathBuf, out: &mut BTreeMap<String, (u64, i64)>) {
        match node {
            MerkleNode::File { size, mtime_secs, .. } => {
                out.insert(prefix.to_string_lossy().replace('\\', "/"), (*size, *mtime_secs));
            }
            MerkleNode::Directory { children, .. } => {
                for (name, child) in children {
                    prefix.push(name);
                    walk(child, prefix, out);
                    prefix.pop();
                }
            }
        }
    }
    walk(node, &mut PathBuf::new(), &mut out);
    out
}

/// Compare two trees and return the set of new/modified/deleted file paths.
///
/// This is `O(changed subtree)`: whenever two directory nodes' hashes are
/// equal, the whole subtree is assumed identical and skipped.
pub fn compare(previous: &MerkleTree, current: &MerkleTree) -> Diff {
    let mut diff = Diff::default();
    compare_nodes(&previous.root, &current.root, &mut PathBuf::new(), &mut diff);
    diff
}

fn compare_nodes(old: &MerkleNode, new: &MerkleNode, prefix: &mut PathBuf, diff: &mut Diff) {
    if old.hash() == new.hash() {
        return;
    }

    match (old, new) {
        (MerkleNode::File { .. }, MerkleNode::File { .. }) => {
            diff.modified.push(path_str(prefix));
        }
        (
            MerkleNode::Directory {
                children: old_children,
                ..
            },
            MerkleNode::Directory {
                children: new_children,
                ..
            },
        ) => {
            let mut names: Vec<&String> = old_children.keys().chain(new_children.keys()).collect();
            names.sort();
            names.dedup();

            for name in names {
                prefix.push(name);
                match (old_children.get(name), new_children.get(name)) {
                    (Some(o), Some(n)) => compare_nodes(o, n, prefix, diff),
                    (Some(o), None) => mark_all(o, prefix, &mut diff.deleted),
                    (None, Some(n)) => mark_all(n, prefix, &mut diff.new),
                    (None, None) => unreachable!(),
                }
                prefix.pop();
            }
        }
        // A path switched kind (file <-> directory): treat as delete+add.
        (old_node, new_node) => {
            mark_all(old_node, prefix, &mut diff.deleted);
            mark_all(new_node, prefix, &mut diff.new);
        }
    }
}

fn mark_all(node: &MerkleNode, prefix: &mut PathBuf, bucket: &mut Vec<String>) {
    match node {
        MerkleNode::File { .. } => bucket.push(path_str(prefix)),
        MerkleNode::Directory { children, .. } => {
            for (name, child) in children {
                prefix.push(name);
                mark_all(child, prefix, bucket);
                prefix.pop();
            }
        }
    }
}

fn path_str(p: &Path) -> String {
    p.to_string_lossy().replace('\\', "/")
}

fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn build(dir: &Path, previous: Option<&MerkleTree>) -> MerkleTree {
        let ignore = IgnoreEngine::load(dir);
        let extensions: Vec<String> = vec![];
        let builder = MerkleBuilder::new(&ignore, &extensions);
        builder.build(dir, previous).unwrap().0
    }

    #[test]
    fn empty_project_has_stable_root_hash() {
        let dir = TempDir::new().unwrap();
        let t1 = build(dir.path(), None);
        let t2 = build(dir.path(), None);
        assert_eq!(t1.root_hash(), t2.root_hash());
    }

    #[test]
    fn content_determines_hash_not_mtime() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();
        let t1 = build(dir.path(), None);

        // Touch mtime without changing content.
        std::thread::sleep(std::time::Duration::from_millis(10));
        fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();
        let t2 = build(dir.path(), None);

        assert_eq!(t1.root_hash(), t2.root_hash());
    }

    #[test]
    fn modifying_one_file_changes_root_and_ancestor_hashes() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.rs"), "fn a() {}").unwrap();
        fs::write(dir.path().join("src/b.rs"), "fn b() {}").unwrap();
        let t1 = build(dir.path(), None);

        fs::write(dir.path().join("src/a.rs"), "fn a2() {}").unwrap();
        let t2 = build(dir.path(), None);

        assert_ne!(t1.root_hash(), t2.root_hash());

        let diff = compare(&t1, &t2);
        assert_eq!(diff.modified, vec!["src/a.rs".to_string()]);
        assert!(diff.new.is_empty());
        assert!(diff.deleted.is_empty());
    }

    #[test]
    fn unrelated_subtree_is_unaffected() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("a/x.rs"), "1").unwrap();
        fs::write(dir.path().join("b/y.rs"), "2").unwrap();
        let t1 = build(dir.path(), None);

        fs::write(dir.path().join("a/x.rs"), "1-changed").unwrap();
        let t2 = build(dir.path(), None);

        let (MerkleNode::Directory { children: c1, .. }) = &t1.root else { panic!() };
        let (MerkleNode::Directory { children: c2, .. }) = &t2.root else { panic!() };
        assert_eq!(c1["b"].hash(), c2["b"].hash());
        assert_ne!(c1["a"].hash(), c2["a"].hash());
    }

    #[test]
    fn diff_detects_add_modify_delete() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("keep.rs"), "keep").unwrap();
        fs::write(dir.path().join("old.rs"), "old").unwrap();
        let t1 = build(dir.path(), None);

        fs::remove_file(dir.path().join("old.rs")).unwrap();
        fs::write(dir.path().join("keep.rs"), "keep-modified").unwrap();
        fs::write(dir.path().join("new.rs"), "new").unwrap();
        let t2 = build(dir.path(), None);

        let diff = compare(&t1, &t2);
        assert_eq!(diff.new, vec!["new.rs".to_string()]);
        assert_eq!(diff.modified, vec!["keep.rs".to_string()]);
        assert_eq!(diff.deleted, vec!["old.rs".to_string()]);
        assert!(diff.has_changes());
    }

    #[test]
    fn unchanged_repo_has_no_diff() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.rs"), "a").unwrap();
        let t1 = build(dir.path(), None);
        let t2 = build(dir.path(), Some(&t1));

        let diff = compare(&t1, &t2);
        assert!(!diff.has_changes());
    }

    #[test]
    fn round_trip_json_preserves_root_hash() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.rs"), "a").unwrap();
        let tree = build(dir.path(), None);

        let json = tree.to_json().unwrap();
        let reloaded = MerkleTree::from_json(&json).unwrap();
        assert_eq!(tree.root_hash(), reloaded.root_hash());
    }

    #[test]
    fn mtime_cache_reuses_hash_for_unchanged_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.rs"), "a").unwrap();
        let ignore = IgnoreEngine::load(dir.path());
        let extensions: Vec<String> = vec![];
        let builder = MerkleBuilder::new(&ignore, &extensions);

        let (t1, stats1) = builder.build(dir.path(), None).unwrap();
        assert_eq!(stats1.files_rehashed, 1);

        let (_, stats2) = builder.build(dir.path(), Some(&t1)).unwrap();
        assert_eq!(stats2.files_reused_from_cache, 1);
        assert_eq!(stats2.files_rehashed, 0);
    }
}
