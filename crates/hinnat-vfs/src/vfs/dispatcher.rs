//! Per-session access-control dispatcher.
//!
//! [`SessionFs`] is the single authority deciding whether an operation on
//! a path is allowed for the session, and which adapter handles it. Every
//! denial is decided here before any backend is touched, and backend errors
//! pass through unchanged.

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;

use crate::constants::{INCOMING_SIZE_LIMIT, PRICELIST_SIZE_LIMIT};
use crate::identity::Identity;
use crate::storage::{IncomingStore, PricelistStore};

use super::error::{Denial, VfsError, VfsResult};
use super::handle::WriteHandle;
use super::path::{Area, VirtualPath};
use super::policy::{DirectoryPolicy, Operation};
use super::types::Entry;

/// Upload ceilings per directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub incoming: usize,
    pub pricelist: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            incoming: INCOMING_SIZE_LIMIT,
            pricelist: PRICELIST_SIZE_LIMIT,
        }
    }
}

/// A mutating protocol command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Remove(String),
    Rename { from: String, to: String },
    Rmdir(String),
    Mkdir(String),
    /// Any method the gateway has no mapping for.
    Other { method: String, path: String },
}

impl Command {
    /// Protocol method name, for logs.
    pub fn method(&self) -> &str {
        match self {
            Command::Remove(_) => "remove",
            Command::Rename { .. } => "rename",
            Command::Rmdir(_) => "rmdir",
            Command::Mkdir(_) => "mkdir",
            Command::Other { method, .. } => method,
        }
    }
}

/// Process-wide, immutable wiring shared by all sessions.
///
/// Holds the active adapters and the policy derived from them. Each
/// authenticated session gets its own [`SessionFs`] from [`Backends::session`].
#[derive(Clone)]
pub struct Backends {
    pricelist: Arc<dyn PricelistStore>,
    incoming: Arc<dyn IncomingStore>,
    policy: DirectoryPolicy,
    limits: UploadLimits,
    started: SystemTime,
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("pricelist", &self.pricelist.name())
            .field("incoming", &self.incoming.name())
            .field("policy", &self.policy)
            .field("limits", &self.limits)
            .finish()
    }
}

impl Backends {
    /// Wire adapters together. The pricelist directory accepts writes only
    /// when its adapter is mutable.
    pub fn new(pricelist: Arc<dyn PricelistStore>, incoming: Arc<dyn IncomingStore>) -> Self {
        let policy = DirectoryPolicy::new(pricelist.is_mutable());
        Self {
            pricelist,
            incoming,
            policy,
            limits: UploadLimits::default(),
            started: SystemTime::now(),
        }
    }

    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn policy(&self) -> &DirectoryPolicy {
        &self.policy
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    /// Bind a dispatcher to one authenticated identity.
    pub fn session(&self, identity: Identity) -> SessionFs {
        SessionFs {
            identity,
            policy: self.policy,
            limits: self.limits,
            pricelist: Arc::clone(&self.pricelist),
            incoming: Arc::clone(&self.incoming),
            started: self.started,
        }
    }
}

/// The virtual filesystem seen by one session.
pub struct SessionFs {
    identity: Identity,
    policy: DirectoryPolicy,
    limits: UploadLimits,
    pricelist: Arc<dyn PricelistStore>,
    incoming: Arc<dyn IncomingStore>,
    /// Timestamp for synthesized directory entries, so repeated listings
    /// compare equal.
    started: SystemTime,
}

impl std::fmt::Debug for SessionFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFs")
            .field("identity", &self.identity)
            .field("policy", &self.policy)
            .finish()
    }
}

impl SessionFs {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Canonical form of a client path. Does not consult policy.
    pub fn realpath(&self, raw: &str) -> String {
        VirtualPath::new(raw).to_string()
    }

    fn check(&self, path: &VirtualPath, op: Operation) -> VfsResult<Area> {
        self.policy.check(path, op).inspect_err(|e| {
            tracing::warn!(
                user = %self.identity,
                path = %path,
                op = op.as_str(),
                "denied: {}",
                e
            );
        })
    }

    fn deny(&self, path: &VirtualPath, op: Operation, reason: Denial) -> VfsError {
        let err = VfsError::denied(path.as_str(), reason);
        tracing::warn!(user = %self.identity, path = %path, op = op.as_str(), "denied: {}", err);
        err
    }

    fn synthesized(&self, area: Area) -> Entry {
        Entry::directory_at(area.dir_name(), self.started)
    }

    /// Fetch a file's full content.
    pub async fn read(&self, raw: &str) -> VfsResult<Bytes> {
        let path = VirtualPath::new(raw);
        tracing::info!(user = %self.identity, path = %path, "reading file");

        self.check(&path, Operation::Read)?;
        if path.is_area_root() {
            return Err(VfsError::is_a_directory(path.as_str()));
        }

        let data = self.pricelist.download(&self.identity, path.within_area()).await?;
        tracing::debug!(user = %self.identity, path = %path, bytes = data.len(), "read complete");
        Ok(data)
    }

    /// Open a file for writing. Content is buffered until the handle closes.
    pub async fn write(&self, raw: &str) -> VfsResult<WriteHandle> {
        let path = VirtualPath::new(raw);
        tracing::info!(user = %self.identity, path = %path, "opening file for write");

        let area = self.check(&path, Operation::Write)?;
        if path.is_area_root() {
            return Err(VfsError::is_a_directory(path.as_str()));
        }

        match area {
            Area::Incoming => {
                if path.depth_in_area() != 1 {
                    return Err(self.deny(&path, Operation::Write, Denial::NoSubdirectories));
                }
                let filename = path.within_area().to_string();
                Ok(WriteHandle::incoming(
                    self.identity.clone(),
                    path,
                    Arc::clone(&self.incoming),
                    filename,
                    self.limits.incoming,
                ))
            }
            Area::Pricelist => {
                let relative = path.within_area().to_string();
                Ok(WriteHandle::pricelist(
                    self.identity.clone(),
                    path,
                    Arc::clone(&self.pricelist),
                    relative,
                    self.limits.pricelist,
                ))
            }
            Area::Root => Err(self.deny(&path, Operation::Write, Denial::ReadOnly)),
        }
    }

    /// List a directory.
    pub async fn list(&self, raw: &str) -> VfsResult<Vec<Entry>> {
        let path = VirtualPath::new(raw);
        tracing::info!(user = %self.identity, path = %path, "listing directory");

        match self.check(&path, Operation::List)? {
            Area::Root => Ok(vec![
                self.synthesized(Area::Incoming),
                self.synthesized(Area::Pricelist),
            ]),
            Area::Incoming => {
                if !path.is_area_root() {
                    return Err(self.deny(&path, Operation::List, Denial::NotRetained));
                }
                if !self.incoming.retains_files() {
                    return Ok(Vec::new());
                }
                Ok(self.incoming.list(&self.identity).await?)
            }
            Area::Pricelist => Ok(self.pricelist.list(&self.identity, path.within_area()).await?),
        }
    }

    /// Metadata of a single path.
    ///
    /// `/`, `/in` and `/Hinnat` are always answered locally, so clients can
    /// change into them even when a backend is unreachable.
    pub async fn stat(&self, raw: &str) -> VfsResult<Entry> {
        let path = VirtualPath::new(raw);
        tracing::debug!(user = %self.identity, path = %path, "stat");

        let area = self.check(&path, Operation::Stat)?;
        if path.is_area_root() {
            return Ok(self.synthesized(area));
        }

        match area {
            Area::Incoming => Err(self.deny(&path, Operation::Stat, Denial::NotRetained)),
            Area::Pricelist => Ok(self.pricelist.metadata(&self.identity, path.within_area()).await?),
            Area::Root => Err(VfsError::not_found(path.as_str())),
        }
    }

    /// Execute a mutating command.
    pub async fn command(&self, command: Command) -> VfsResult<()> {
        tracing::info!(user = %self.identity, method = command.method(), "file command");

        match command {
            Command::Remove(raw) => self.forbidden(&VirtualPath::new(&raw), Operation::Remove),
            Command::Rmdir(raw) => self.forbidden(&VirtualPath::new(&raw), Operation::Rmdir),
            Command::Rename { from, to } => {
                let from = VirtualPath::new(&from);
                let to = VirtualPath::new(&to);
                if to.area().is_none() && from.area().is_some() {
                    return self.forbidden(&to, Operation::Rename);
                }
                self.forbidden(&from, Operation::Rename)
            }
            Command::Mkdir(raw) => self.mkdir(&VirtualPath::new(&raw)).await,
            Command::Other { method, path } => {
                let path = VirtualPath::new(&path);
                if path.area().is_none() {
                    return Err(self.deny(&path, Operation::Stat, Denial::OutsideNamespace));
                }
                tracing::warn!(user = %self.identity, path = %path, method = %method, "unsupported method");
                Err(VfsError::unsupported(method))
            }
        }
    }

    pub async fn remove(&self, raw: &str) -> VfsResult<()> {
        self.command(Command::Remove(raw.to_string())).await
    }

    pub async fn rmdir(&self, raw: &str) -> VfsResult<()> {
        self.command(Command::Rmdir(raw.to_string())).await
    }

    pub async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        self.command(Command::Rename {
            from: from.to_string(),
            to: to.to_string(),
        })
        .await
    }

    pub async fn mkdir_path(&self, raw: &str) -> VfsResult<()> {
        self.command(Command::Mkdir(raw.to_string())).await
    }

    fn forbidden(&self, path: &VirtualPath, op: Operation) -> VfsResult<()> {
        self.check(path, op)?;
        Err(self.deny(path, op, Denial::Forbidden(op.as_str())))
    }

    async fn mkdir(&self, path: &VirtualPath) -> VfsResult<()> {
        self.check(path, Operation::Mkdir)?;
        if path.is_area_root() {
            return Err(VfsError::already_exists(path.as_str()));
        }
        self.pricelist.mkdir(&self.identity, path.within_area()).await?;
        tracing::info!(user = %self.identity, path = %path, "directory created");
        Ok(())
    }
}
