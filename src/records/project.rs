//! Canonical project identity for a working directory.
//!
//! The canonical name is the git `origin` remote normalized to
//! `host/owner/repo` when one exists, otherwise the folder name. When the two
//! differ the folder name is registered as an alias so records written before
//! the remote existed stay reachable.

use std::path::Path;
use std::process::{Command, Stdio};

use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use super::aliases::{register_alias, AliasRegistration};
use crate::error::Result;

/// Cached answer to "can we run `git`?".
///
/// Owned by the caller and resettable, so tests and long-running servers decide
/// when to probe again.
#[derive(Debug, Default, Clone)]
pub struct GitProbe {
    available: Option<bool>,
}

impl GitProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// A probe with a fixed answer, skipping the `git --version` check.
    pub fn with_availability(available: bool) -> Self {
        Self {
            available: Some(available),
        }
    }

    pub fn is_available(&mut self) -> bool {
        *self.available.get_or_insert_with(|| {
            let ok = Command::new("git")
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok_and(|s| s.success());
            debug!(available = ok, "probed for git");
            ok
        })
    }

    /// Forget the cached answer.
    pub fn reset(&mut self) {
        self.available = None;
    }

    fn origin_url(&mut self, cwd: &Path) -> Option<String> {
        if !self.is_available() {
            return None;
        }
        let output = Command::new("git")
            .arg("-C")
            .arg(cwd)
            .args(["remote", "get-url", "origin"])
            .stderr(Stdio::null())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!url.is_empty()).then_some(url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    GitRemote,
    Folder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectIdentity {
    pub canonical: String,
    pub folder: String,
    pub source: IdentitySource,
}

/// Work out the canonical project for `cwd`.
pub fn resolve(cwd: &Path, probe: &mut GitProbe) -> ProjectIdentity {
    let folder = cwd
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    match probe.origin_url(cwd).and_then(|url| normalize_remote(&url)) {
        Some(canonical) => ProjectIdentity {
            canonical,
            folder,
            source: IdentitySource::GitRemote,
        },
        None => ProjectIdentity {
            canonical: folder.clone(),
            folder,
            source: IdentitySource::Folder,
        },
    }
}

/// Resolve `cwd` and register `folder -> canonical` when they differ.
pub fn ensure_project_identity(
    conn: &Connection,
    cwd: &Path,
    probe: &mut GitProbe,
) -> Result<ProjectIdentity> {
    let identity = resolve(cwd, probe);
    register_identity(conn, &identity)?;
    Ok(identity)
}

pub fn register_identity(conn: &Connection, identity: &ProjectIdentity) -> Result<AliasRegistration> {
    register_alias(conn, &identity.folder, &identity.canonical)
}

/// Reduce a git remote URL to `host/owner/repo`.
///
/// Handles scp-style (`git@host:owner/repo.git`), `ssh://`, `git://` and
/// `http(s)://` forms. Credentials and ports are dropped.
pub fn normalize_remote(url: &str) -> Option<String> {
    let url = url.trim();
    let (host, path) = if let Some((_, rest)) = url.split_once("://") {
        let rest = rest.rsplit_once('@').map_or(rest, |(_, r)| r);
        let (host, path) = rest.split_once('/')?;
        (host.split(':').next()?, path)
    } else {
        // scp-like: [user@]host:path
        let rest = url.rsplit_once('@').map_or(url, |(_, r)| r);
        let (host, path) = rest.split_once(':')?;
        (host, path)
    };

    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    if host.is_empty() || path.is_empty() || !path.contains('/') {
        return None;
    }
    Some(format!("{}/{}", host.to_ascii_lowercase(), path))
}
