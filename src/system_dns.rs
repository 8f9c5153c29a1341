//! System DNS servers: read from the host resolver configuration and kept
//! current by watching it for changes.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use futures::channel::mpsc;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tracing::{debug, error, info, warn};

use crate::cache::ResponseCache;
use crate::error::IngestError;
use crate::upstream::{UpstreamRegistry, UpstreamServer};

pub const DEFAULT_RESOLV_CONF: &str = "/etc/resolv.conf";

/// Extract `nameserver <addr>` values in file order. Other lines, and
/// nameserver lines with extra fields, are skipped.
pub fn parse_nameservers<R: BufRead>(reader: R) -> std::io::Result<Vec<String>> {
    let mut servers = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.starts_with("nameserver") {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            ["nameserver", addr] => servers.push(addr.to_string()),
            _ => debug!(line, "skipping malformed nameserver line"),
        }
    }
    Ok(servers)
}

/// Whether a filesystem event should trigger a re-ingest.
pub fn is_relevant(event: &Event, file_name: &str) -> bool {
    let kind_matches = match event.kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    };
    kind_matches
        && event.paths.iter().any(|p| {
            p.file_name()
                .is_some_and(|n| n.to_string_lossy().contains(file_name))
        })
}

/// Feeds the registry's system set from the host resolver configuration.
pub struct SystemDns {
    path: PathBuf,
    registry: Arc<UpstreamRegistry>,
    cache: Arc<ResponseCache>,
}

impl SystemDns {
    pub fn new(
        path: impl Into<PathBuf>,
        registry: Arc<UpstreamRegistry>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        Self {
            path: path.into(),
            registry,
            cache,
        }
    }

    /// Read the resolver configuration, replace the system set and purge
    /// the cache. On error nothing is changed.
    pub fn ingest_once(&self) -> Result<Arc<Vec<UpstreamServer>>, IngestError> {
        let file = File::open(&self.path).map_err(|source| IngestError::Open {
            path: self.path.clone(),
            source,
        })?;
        let nameservers =
            parse_nameservers(BufReader::new(file)).map_err(|source| IngestError::Read {
                path: self.path.clone(),
                source,
            })?;

        let system = self.registry.replace_system_servers(nameservers);
        self.cache.purge_all();

        info!(
            custom = %join(self.registry.custom_servers()),
            system = %join(&system),
            "upstream servers updated"
        );
        Ok(system)
    }

    /// [`Self::ingest_once`], logging instead of returning the error.
    pub fn refresh(&self) {
        if let Err(e) = self.ingest_once() {
            warn!(error = %e, "keeping previous system DNS servers");
        }
    }

    /// Directory to watch and the file name to match inside it. Symlinks
    /// are resolved first, so `/etc/resolv.conf` on macOS watches
    /// `/private/var/run`.
    pub fn watch_target(&self) -> (PathBuf, String) {
        let resolved = std::fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
        let dir = resolved
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        let name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        (dir, name)
    }

    /// Re-ingest on every relevant change until the process exits.
    ///
    /// A watcher that cannot be started is logged and leaves the system
    /// set as it is. Re-reads run on the blocking pool.
    pub async fn watch(self: Arc<Self>) {
        let (dir, file_name) = self.watch_target();
        let (tx, mut rx) = mpsc::unbounded();

        let mut watcher = match notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.unbounded_send(res);
        }) {
            Ok(w) => w,
            Err(e) => {
                error!(error = %e, "cannot start resolver watcher, DNS changes will be missed");
                return;
            }
        };
        if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            error!(dir = %dir.display(), error = %e, "cannot watch resolver directory, DNS changes will be missed");
            return;
        }
        info!(dir = %dir.display(), file = %file_name, "watching for DNS changes");

        while let Some(res) = rx.next().await {
            match res {
                Ok(event) if is_relevant(&event, &file_name) => {
                    debug!(kind = ?event.kind, "resolver configuration changed");
                    let dns = self.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || dns.refresh()).await {
                        warn!(error = %e, "resolver configuration refresh did not complete");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            }
        }
    }
}

fn join(servers: &[UpstreamServer]) -> String {
    servers
        .iter()
        .map(UpstreamServer::host)
        .collect::<Vec<_>>()
        .join(",")
}
