//! Per-domain files under `/etc/resolver/` that point macOS lookups for a
//! domain at this daemon.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::ResolverFileError;
use crate::upstream::CustomDomain;

pub const DEFAULT_RESOLVER_DIR: &str = "/etc/resolver";

/// Owns the resolver files for the configured domains.
pub struct ResolverFiles {
    dir: PathBuf,
    port: u16,
}

impl ResolverFiles {
    /// `port` is the port the daemon listens on; a `port` line is added to
    /// each file when it is not 53.
    pub fn new(dir: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            dir: dir.into(),
            port,
        }
    }

    pub fn path_for(&self, domain: &CustomDomain) -> PathBuf {
        self.dir.join(domain.as_str())
    }

    /// File body for every domain.
    pub fn contents(&self) -> String {
        if self.port == 53 {
            "nameserver 127.0.0.1\n".to_string()
        } else {
            format!("nameserver 127.0.0.1\nport {}\n", self.port)
        }
    }

    /// Create the directory if needed and write one file per domain.
    pub fn ensure(&self, domains: &[CustomDomain]) -> Result<(), ResolverFileError> {
        if !self.dir.is_dir() {
            fs::create_dir_all(&self.dir).map_err(|source| ResolverFileError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;
            info!(dir = %self.dir.display(), "created resolver directory");
        }

        let contents = self.contents();
        for domain in domains {
            let path = self.path_for(domain);
            fs::write(&path, &contents).map_err(|source| ResolverFileError::Write {
                path: path.clone(),
                source,
            })?;
            info!(file = %path.display(), "created resolver file");
        }
        Ok(())
    }

    /// Remove every domain's file. Failures are logged and skipped.
    pub fn teardown(&self, domains: &[CustomDomain]) {
        for domain in domains {
            let path = self.path_for(domain);
            match fs::remove_file(&path) {
                Ok(()) => info!(file = %path.display(), "deleted resolver file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!(file = %path.display(), "resolver file already gone")
                }
                Err(e) => warn!(file = %path.display(), error = %e, "cannot remove resolver file"),
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains(names: &[&str]) -> Vec<CustomDomain> {
        names.iter().map(|d| CustomDomain::new(d)).collect()
    }

    #[test]
    fn ensure_creates_missing_directory_and_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("resolver");
        let files = ResolverFiles::new(&dir, 53);

        files.ensure(&domains(&["example.com", "corp.internal"])).unwrap();

        assert_eq!(
            fs::read_to_string(dir.join("example.com")).unwrap(),
            "nameserver 127.0.0.1\n"
        );
        assert!(dir.join("corp.internal").is_file());
    }

    #[test]
    fn non_standard_port_is_written() {
        let tmp = tempfile::tempdir().unwrap();
        let files = ResolverFiles::new(tmp.path(), 5353);
        files.ensure(&domains(&["example.com"])).unwrap();

        assert_eq!(
            fs::read_to_string(tmp.path().join("example.com")).unwrap(),
            "nameserver 127.0.0.1\nport 5353\n"
        );
    }

    #[test]
    fn teardown_removes_files_and_tolerates_missing_ones() {
        let tmp = tempfile::tempdir().unwrap();
        let files = ResolverFiles::new(tmp.path(), 53);
        let ds = domains(&["example.com", "corp.internal"]);
        files.ensure(&ds).unwrap();
        fs::remove_file(tmp.path().join("corp.internal")).unwrap();

        files.teardown(&ds);

        assert!(!tmp.path().join("example.com").exists());
    }

    #[test]
    fn unwritable_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let files = ResolverFiles::new(blocker.join("resolver"), 53);

        let err = files.ensure(&domains(&["example.com"])).unwrap_err();
        assert!(matches!(err, ResolverFileError::CreateDir { .. }));
    }
}
