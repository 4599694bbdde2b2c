//! Per-directory operation policy.
//!
//! The policy is the same for every session. It is derived once at startup
//! from whether the pricelist backend is mutable, and only the data reachable
//! through a directory varies with identity.

use super::error::{Denial, VfsError, VfsResult};
use super::path::{Area, VirtualPath};

/// A protocol-level operation subject to policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    List,
    Stat,
    Mkdir,
    Remove,
    Rename,
    Rmdir,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::List => "list",
            Operation::Stat => "stat",
            Operation::Mkdir => "mkdir",
            Operation::Remove => "delete",
            Operation::Rename => "rename",
            Operation::Rmdir => "directory removal",
        }
    }
}

/// Operations permitted inside one directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions {
    pub list: bool,
    pub read: bool,
    pub write: bool,
    pub mkdir: bool,
}

/// Directory whitelist and what each directory allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryPolicy {
    root: Permissions,
    incoming: Permissions,
    pricelist: Permissions,
}

impl DirectoryPolicy {
    /// Build the policy. `pricelist_mutable` is true only for deployments
    /// whose pricelist adapter is backed by mutable object storage.
    pub fn new(pricelist_mutable: bool) -> Self {
        Self {
            root: Permissions {
                list: true,
                ..Default::default()
            },
            incoming: Permissions {
                list: true,
                write: true,
                ..Default::default()
            },
            pricelist: Permissions {
                list: true,
                read: true,
                write: pricelist_mutable,
                mkdir: pricelist_mutable,
            },
        }
    }

    pub fn permissions(&self, area: Area) -> Permissions {
        match area {
            Area::Root => self.root,
            Area::Incoming => self.incoming,
            Area::Pricelist => self.pricelist,
        }
    }

    /// Decide whether `op` on `path` is allowed, returning the path's area.
    pub fn check(&self, path: &VirtualPath, op: Operation) -> VfsResult<Area> {
        let Some(area) = path.area() else {
            return Err(VfsError::denied(path.as_str(), Denial::OutsideNamespace));
        };
        let perms = self.permissions(area);

        let allowed = match op {
            Operation::Remove | Operation::Rename | Operation::Rmdir => {
                return Err(VfsError::denied(path.as_str(), Denial::Forbidden(op.as_str())));
            }
            Operation::Read if area == Area::Incoming => {
                return Err(VfsError::denied(path.as_str(), Denial::WriteOnly));
            }
            Operation::Read => perms.read,
            Operation::Write => perms.write,
            Operation::Mkdir => perms.mkdir,
            Operation::List => perms.list,
            Operation::Stat => true,
        };

        if allowed {
            Ok(area)
        } else if matches!(op, Operation::Write | Operation::Mkdir) {
            Err(VfsError::denied(path.as_str(), Denial::ReadOnly))
        } else {
            Err(VfsError::denied(path.as_str(), Denial::Forbidden(op.as_str())))
        }
    }
}

impl Default for DirectoryPolicy {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(policy: &DirectoryPolicy, path: &str, op: Operation) -> VfsResult<Area> {
        policy.check(&VirtualPath::new(path), op)
    }

    #[test]
    fn test_outside_namespace_denied_for_every_operation() {
        let policy = DirectoryPolicy::new(true);
        for op in [
            Operation::Read,
            Operation::Write,
            Operation::List,
            Operation::Stat,
            Operation::Mkdir,
            Operation::Remove,
            Operation::Rename,
            Operation::Rmdir,
        ] {
            let err = check(&policy, "/etc/passwd", op).unwrap_err();
            assert_eq!(err.denial(), Some(Denial::OutsideNamespace), "{:?}", op);
        }
    }

    #[test]
    fn test_root_is_list_only() {
        let policy = DirectoryPolicy::new(true);
        assert_eq!(check(&policy, "/", Operation::List).unwrap(), Area::Root);
        assert!(check(&policy, "/", Operation::Read).unwrap_err().is_denied());
        assert_eq!(
            check(&policy, "/", Operation::Write).unwrap_err().denial(),
            Some(Denial::ReadOnly)
        );
        assert!(check(&policy, "/", Operation::Mkdir).unwrap_err().is_denied());
    }

    #[test]
    fn test_incoming_is_write_only() {
        let policy = DirectoryPolicy::new(true);
        assert_eq!(check(&policy, "/in/a.txt", Operation::Write).unwrap(), Area::Incoming);
        assert_eq!(
            check(&policy, "/in/a.txt", Operation::Read).unwrap_err().denial(),
            Some(Denial::WriteOnly)
        );
        assert_eq!(
            check(&policy, "/in/sub", Operation::Mkdir).unwrap_err().denial(),
            Some(Denial::ReadOnly)
        );
    }

    #[test]
    fn test_pricelist_mutability_follows_backend() {
        let mutable = DirectoryPolicy::new(true);
        let readonly = DirectoryPolicy::new(false);

        assert!(check(&mutable, "/Hinnat/x.zip", Operation::Write).is_ok());
        assert!(check(&mutable, "/Hinnat/new", Operation::Mkdir).is_ok());
        assert!(check(&readonly, "/Hinnat/x.zip", Operation::Read).is_ok());
        assert_eq!(
            check(&readonly, "/Hinnat/x.zip", Operation::Write).unwrap_err().denial(),
            Some(Denial::ReadOnly)
        );
        assert!(!readonly.permissions(Area::Pricelist).write);
    }

    #[test]
    fn test_destructive_operations_always_denied() {
        let policy = DirectoryPolicy::new(true);
        for path in ["/", "/in", "/in/a.txt", "/Hinnat", "/Hinnat/salhydro_kaikki.zip"] {
            for op in [Operation::Remove, Operation::Rename, Operation::Rmdir] {
                let err = check(&policy, path, op).unwrap_err();
                assert!(matches!(err.denial(), Some(Denial::Forbidden(_))), "{} {:?}", path, op);
            }
        }
    }
}
