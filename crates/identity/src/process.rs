//! Process identity resolution from the OS process table.
//!
//! The resolver reads uid/gid, supplementary groups and executable paths for a
//! pid through the [`ProcessTable`] capability. The default [`ProcfsTable`]
//! reads the Linux `/proc` tree (or `$HOST_PROC` when the attestor runs in a
//! container with the host's tree mounted elsewhere).
//!
//! # Id selection
//!
//! The status record reports real, effective, saved and filesystem ids. When
//! exactly one id is reported it is used; otherwise the second (effective) id
//! is used. No ids at all fails the resolution.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{AttestError, AttestResult};

/// Environment variable overriding the process-information root.
pub const HOST_PROC_ENV: &str = "HOST_PROC";

const DEFAULT_PROC_ROOT: &str = "/proc";

/// Raw identity primitives for one process.
pub trait ProcessInfo: Send {
    /// User ids as reported by the OS (real, effective, saved, filesystem)
    fn uids(&self) -> io::Result<Vec<u32>>;
    /// Group ids as reported by the OS (real, effective, saved, filesystem)
    fn gids(&self) -> io::Result<Vec<u32>>;
    /// Supplementary group ids; empty on platforms without support
    fn groups(&self) -> io::Result<Vec<String>>;
    /// Executable path as reported by the process
    fn exe(&self) -> io::Result<PathBuf>;
    /// Executable path reachable from the resolver's own namespace, if the platform has one
    fn namespaced_exe(&self) -> Option<PathBuf>;
}

/// Access to the OS process table.
pub trait ProcessTable: Send + Sync {
    fn open(&self, pid: i32) -> io::Result<Box<dyn ProcessInfo>>;
}

/// Process table backed by a procfs tree.
#[derive(Debug, Clone)]
pub struct ProcfsTable {
    root: PathBuf,
}

impl ProcfsTable {
    /// Use `$HOST_PROC`, falling back to `/proc`.
    pub fn from_env() -> Self {
        let root = std::env::var_os(HOST_PROC_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT));
        Self { root }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn proc_path(&self, pid: i32, last: &str) -> PathBuf {
        self.root.join(pid.to_string()).join(last)
    }
}

impl Default for ProcfsTable {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ProcessTable for ProcfsTable {
    fn open(&self, pid: i32) -> io::Result<Box<dyn ProcessInfo>> {
        if pid <= 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid pid {}", pid),
            ));
        }

        // One read per request: every field comes from the same snapshot.
        let status = fs::read_to_string(self.proc_path(pid, "status"))?;

        Ok(Box::new(ProcfsProcess {
            exe_link: self.proc_path(pid, "exe"),
            status,
        }))
    }
}

struct ProcfsProcess {
    exe_link: PathBuf,
    status: String,
}

impl ProcfsProcess {
    fn field(&self, key: &str) -> Option<&str> {
        status_field(&self.status, key)
    }

    fn ids(&self, key: &str) -> io::Result<Vec<u32>> {
        let Some(value) = self.field(key) else {
            return Ok(Vec::new());
        };

        value
            .split_whitespace()
            .map(|id| {
                id.parse::<u32>().map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("invalid {} entry {:?}: {}", key, id, e),
                    )
                })
            })
            .collect()
    }
}

impl ProcessInfo for ProcfsProcess {
    fn uids(&self) -> io::Result<Vec<u32>> {
        self.ids("uid")
    }

    fn gids(&self) -> io::Result<Vec<u32>> {
        self.ids("gid")
    }

    #[cfg(target_os = "linux")]
    fn groups(&self) -> io::Result<Vec<String>> {
        Ok(self
            .field("groups")
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default())
    }

    #[cfg(not(target_os = "linux"))]
    fn groups(&self) -> io::Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn exe(&self) -> io::Result<PathBuf> {
        fs::read_link(&self.exe_link)
    }

    #[cfg(target_os = "linux")]
    fn namespaced_exe(&self) -> Option<PathBuf> {
        Some(self.exe_link.clone())
    }

    #[cfg(not(target_os = "linux"))]
    fn namespaced_exe(&self) -> Option<PathBuf> {
        None
    }
}

/// Value of a `Key: value` line, matching the key case-insensitively.
fn status_field<'a>(status: &'a str, key: &str) -> Option<&'a str> {
    status.lines().find_map(|row| {
        let (name, value) = row.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case(key)
            .then(|| value.trim())
    })
}

/// Executable locations for a resolved process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutablePaths {
    /// Path reported for the `path` selector
    pub reported: String,
    /// Path opened to compute the content digest
    pub digest_source: PathBuf,
}

/// Raw OS identity of a process, before name enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProcess {
    pub uid: String,
    pub gid: String,
    pub supplementary_gids: Vec<String>,
    /// Present only when path discovery was requested
    pub executable: Option<ExecutablePaths>,
}

/// Resolves uid/gid, supplementary groups and executable paths for a pid.
#[derive(Clone)]
pub struct ProcessIdentityResolver {
    table: Arc<dyn ProcessTable>,
}

impl ProcessIdentityResolver {
    pub fn new(table: Arc<dyn ProcessTable>) -> Self {
        Self { table }
    }

    pub fn resolve(&self, pid: i32, discover_path: bool) -> AttestResult<ResolvedProcess> {
        let proc = self
            .table
            .open(pid)
            .map_err(|e| AttestError::resolution("failed to get process", e))?;

        let uids = proc
            .uids()
            .map_err(|e| AttestError::resolution("UIDs lookup", e))?;
        let uid = select_id(&uids, "UIDs lookup", "no UIDs for process")?;

        let gids = proc
            .gids()
            .map_err(|e| AttestError::resolution("GIDs lookup", e))?;
        let gid = select_id(&gids, "GIDs lookup", "no GIDs for process")?;

        let supplementary_gids = proc
            .groups()
            .map_err(|e| AttestError::resolution("supplementary GIDs lookup", e))?;

        let executable = if discover_path {
            Some(executable_paths(proc.as_ref())?)
        } else {
            None
        };

        debug!(
            pid,
            uid = %uid,
            gid = %gid,
            supplementary = supplementary_gids.len(),
            "process resolved"
        );

        Ok(ResolvedProcess {
            uid,
            gid,
            supplementary_gids,
            executable,
        })
    }
}

fn select_id(ids: &[u32], stage: &'static str, empty: &str) -> AttestResult<String> {
    match ids {
        [] => Err(AttestError::resolution(stage, empty)),
        [only] => Ok(only.to_string()),
        [_, effective, ..] => Ok(effective.to_string()),
    }
}

fn executable_paths(proc: &dyn ProcessInfo) -> AttestResult<ExecutablePaths> {
    let reported = proc
        .exe()
        .map_err(|e| AttestError::resolution("path lookup", e))?;

    let digest_source = proc.namespaced_exe().unwrap_or_else(|| reported.clone());

    Ok(ExecutablePaths {
        reported: reported.to_string_lossy().into_owned(),
        digest_source,
    })
}
