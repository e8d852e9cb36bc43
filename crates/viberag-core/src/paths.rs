//! Path/identity resolver (spec §4.1).
//!
//! Computes deterministic per-project data and runtime paths from
//! `(project_root, home_dir)`. Every path is derived from the project's
//! realpath so symlinked invocations of the same project share identity,
//! and no path ever points inside the project tree.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

/// Resolves `project_id` and all on-disk/runtime paths for one project.
#[derive(Debug, Clone)]
pub struct PathResolver {
    project_root: PathBuf,
    home_dir: PathBuf,
    project_id: String,
}

impl PathResolver {
    /// Build a resolver for `project_root`, overriding the home directory
    /// with `home_dir_override` if given, else `$VIBERAG_HOME`, else
    /// `$XDG_DATA_HOME/viberag` on Linux, else `dirs::data_dir()/viberag`.
    pub fn new(project_root: &Path, home_dir_override: Option<PathBuf>) -> Result<Self> {
        let project_root = project_root
            .canonicalize()
            .map_err(|_| CoreError::ProjectRootNotFound(project_root.to_path_buf()))?;

        let home_dir = home_dir_override.unwrap_or_else(default_home_dir);
        let project_id = compute_project_id(&project_root);

        Ok(Self {
            project_root,
            home_dir,
            project_id,
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// `<HOME>/projects/<project_id>`
    pub fn viberag_dir(&self) -> PathBuf {
        self.home_dir.join("projects").join(&self.project_id)
    }

    /// `<HOME>/projects/<project_id>/lancedb`
    pub fn lancedb_path(&self) -> PathBuf {
        self.viberag_dir().join("lancedb")
    }

    /// `<HOME>/projects/<project_id>/manifest.json`
    pub fn manifest_path(&self) -> PathBuf {
        self.viberag_dir().join("manifest.json")
    }

    /// `<HOME>/projects/<project_id>/config.json`
    pub fn config_path(&self) -> PathBuf {
        self.viberag_dir().join("config.json")
    }

    /// `<HOME>/run/<project_id>`
    pub fn run_dir(&self) -> PathBuf {
        self.home_dir.join("run").join(&self.project_id)
    }

    /// Unix domain socket path, or a named-pipe string on Windows.
    pub fn socket_path(&self) -> SocketAddr {
        #[cfg(windows)]
        {
            SocketAddr::NamedPipe(format!(r"\\.\pipe\viberag-{}", self.project_id))
        }
        #[cfg(not(windows))]
        {
            SocketAddr::Unix(self.run_dir().join("daemon.sock"))
        }
    }

    pub fn pid_path(&self) -> PathBuf {
        self.run_dir().join("daemon.pid")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.run_dir().join("daemon.lock")
    }

    /// `<HOME>/projects/<project_id>/logs/<service>/YYYY-MM-DD-HH.log`
    pub fn service_log_path(&self, service: &str, timestamp: chrono::DateTime<chrono::Utc>) -> PathBuf {
        self.viberag_dir()
            .join("logs")
            .join(service)
            .join(format!("{}.log", timestamp.format("%Y-%m-%d-%H")))
    }
}

/// The daemon's listen address: a Unix socket path everywhere this daemon
/// actually runs, or a Windows named pipe name (declared for completeness,
/// not wired up end to end — see DESIGN.md).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketAddr {
    Unix(PathBuf),
    NamedPipe(String),
}

fn default_home_dir() -> PathBuf {
    if let Ok(override_dir) = std::env::var("VIBERAG_HOME") {
        return PathBuf::from(override_dir);
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join("viberag");
        }
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("viberag")
}

/// `project_id` = first 20 hex chars of SHA-256("viberag:" || realpath(project_root)).
pub fn compute_project_id(realpath: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"viberag:");
    hasher.update(realpath.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..20].to_string()
}

/// Minimal hex encoding so we don't pull in a dependency solely for this.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        use std::fmt::Write;
        let mut s = String::with_capacity(bytes.as_ref().len() * 2);
        for b in bytes.as_ref() {
            let _ = write!(s, "{:02x}", b);
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn project_id_is_deterministic() {
        let a = compute_project_id(Path::new("/tmp/foo"));
        let b = compute_project_id(Path::new("/tmp/foo"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);
    }

    #[test]
    fn project_id_differs_by_path() {
        let a = compute_project_id(Path::new("/tmp/foo"));
        let b = compute_project_id(Path::new("/tmp/bar"));
        assert_ne!(a, b);
    }

    #[test]
    fn paths_are_namespaced_under_home() {
        let dir = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let resolver =
            PathResolver::new(dir.path(), Some(home.path().to_path_buf())).unwrap();

        assert!(resolver.viberag_dir().starts_with(home.path()));
        assert!(resolver.run_dir().starts_with(home.path()));
        assert_eq!(resolver.lancedb_path(), resolver.viberag_dir().join("lancedb"));
    }

    #[test]
    fn missing_project_root_errors() {
        let err = PathResolver::new(Path::new("/nonexistent/path/xyz"), None);
        assert!(err.is_err());
    }
}
