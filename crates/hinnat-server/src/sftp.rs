//! SFTP protocol translation.
//!
//! Maps russh-sftp requests onto a session's [`SessionFs`]. The protocol
//! layer owns the handle table; every access decision is the dispatcher's.

use std::collections::HashMap;

use hinnat_vfs::vfs::{Command, Entry, SessionFs, VfsError, WriteHandle};
use hinnat_vfs::Bytes;
use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode, Version,
};
use russh_sftp::server::Handler;

/// Map a dispatcher error onto an SFTP status code.
pub fn status_for(err: &VfsError) -> StatusCode {
    match err {
        VfsError::AccessDenied { .. } => StatusCode::PermissionDenied,
        VfsError::NotFound(_) => StatusCode::NoSuchFile,
        VfsError::Unsupported(_) => StatusCode::OpUnsupported,
        _ => StatusCode::Failure,
    }
}

/// SFTP attributes for a listing or stat entry.
pub fn attributes(entry: &Entry) -> FileAttributes {
    let mtime = u32::try_from(entry.mtime_secs()).unwrap_or(u32::MAX);
    FileAttributes {
        size: Some(entry.size),
        permissions: Some(entry.mode()),
        atime: Some(mtime),
        mtime: Some(mtime),
        ..Default::default()
    }
}

enum OpenHandle {
    /// Content and metadata fetched once at open; reads are served from memory.
    Read { entry: Entry, data: Bytes },
    Write(WriteHandle),
    Dir { entries: Option<Vec<Entry>> },
}

/// One SFTP subsystem instance, bound to an authenticated session.
///
/// Dropping the session drops any open write handles unflushed.
pub struct SftpSession {
    fs: SessionFs,
    handles: HashMap<String, OpenHandle>,
    next_handle: u64,
}

impl SftpSession {
    pub fn new(fs: SessionFs) -> Self {
        Self {
            fs,
            handles: HashMap::new(),
            next_handle: 0,
        }
    }

    fn insert(&mut self, handle: OpenHandle) -> String {
        self.next_handle += 1;
        let key = format!("h{}", self.next_handle);
        self.handles.insert(key.clone(), handle);
        key
    }

    fn fail(&self, method: &str, err: VfsError) -> StatusCode {
        let code = status_for(&err);
        if err.is_denied() {
            tracing::debug!(user = %self.fs.identity(), method, "request denied: {}", err);
        } else {
            tracing::warn!(user = %self.fs.identity(), method, "request failed: {}", err);
        }
        code
    }

    fn ok(id: u32) -> Status {
        Status {
            id,
            status_code: StatusCode::Ok,
            error_message: "Ok".to_string(),
            language_tag: "en-US".to_string(),
        }
    }

    async fn run_command(&self, id: u32, command: Command) -> Result<Status, StatusCode> {
        let method = command.method().to_string();
        self.fs
            .command(command)
            .await
            .map(|_| Self::ok(id))
            .map_err(|e| self.fail(&method, e))
    }
}

impl Handler for SftpSession {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        tracing::debug!(user = %self.fs.identity(), version, "sftp init");
        Ok(Version::new())
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let resolved = self.fs.realpath(&path);
        Ok(Name {
            id,
            files: vec![File::dummy(resolved)],
        })
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let entry = self.fs.stat(&path).await.map_err(|e| self.fail("stat", e))?;
        Ok(Attrs {
            id,
            attrs: attributes(&entry),
        })
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        self.stat(id, path).await
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let attrs = match self.handles.get(&handle) {
            Some(OpenHandle::Read { entry, .. }) => attributes(entry),
            Some(OpenHandle::Write(w)) => {
                let name = w.path().file_name().unwrap_or_default();
                attributes(&Entry::file(name, w.len() as u64, std::time::SystemTime::now()))
            }
            Some(OpenHandle::Dir { .. }) => attributes(&Entry::directory("")),
            None => return Err(StatusCode::Failure),
        };
        Ok(Attrs { id, attrs })
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let writing = pflags.intersects(
            OpenFlags::WRITE | OpenFlags::APPEND | OpenFlags::CREATE | OpenFlags::TRUNCATE,
        );
        let handle = if writing {
            let w = self.fs.write(&filename).await.map_err(|e| self.fail("open", e))?;
            OpenHandle::Write(w)
        } else {
            let data = self.fs.read(&filename).await.map_err(|e| self.fail("open", e))?;
            let mut entry = self.fs.stat(&filename).await.map_err(|e| self.fail("open", e))?;
            entry.size = data.len() as u64;
            OpenHandle::Read { entry, data }
        };
        Ok(Handle {
            id,
            handle: self.insert(handle),
        })
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        match self.handles.get(&handle) {
            Some(OpenHandle::Read { data, .. }) => {
                let total = data.len() as u64;
                if offset >= total {
                    return Err(StatusCode::Eof);
                }
                let start = offset as usize;
                let end = start.saturating_add(len as usize).min(data.len());
                Ok(Data {
                    id,
                    data: data.slice(start..end).to_vec(),
                })
            }
            Some(_) => Err(StatusCode::PermissionDenied),
            None => Err(StatusCode::Failure),
        }
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let result = match self.handles.get_mut(&handle) {
            Some(OpenHandle::Write(w)) => w.write_at(offset, &data),
            Some(_) => return Err(StatusCode::PermissionDenied),
            None => return Err(StatusCode::Failure),
        };
        result.map(|_| Self::ok(id)).map_err(|e| self.fail("write", e))
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        match self.handles.remove(&handle) {
            Some(OpenHandle::Write(w)) => {
                w.close().await.map_err(|e| self.fail("close", e))?;
            }
            Some(_) => {}
            None => return Err(StatusCode::Failure),
        }
        Ok(Self::ok(id))
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        let entries = self.fs.list(&path).await.map_err(|e| self.fail("opendir", e))?;
        Ok(Handle {
            id,
            handle: self.insert(OpenHandle::Dir {
                entries: Some(entries),
            }),
        })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        match self.handles.get_mut(&handle) {
            Some(OpenHandle::Dir { entries }) => match entries.take() {
                Some(entries) if !entries.is_empty() => Ok(Name {
                    id,
                    files: entries
                        .iter()
                        .map(|e| File::new(e.name.clone(), attributes(e)))
                        .collect(),
                }),
                _ => Err(StatusCode::Eof),
            },
            Some(_) => Err(StatusCode::Failure),
            None => Err(StatusCode::Failure),
        }
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        self.run_command(id, Command::Mkdir(path)).await
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        self.run_command(id, Command::Remove(filename)).await
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        self.run_command(id, Command::Rmdir(path)).await
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> Result<Status, Self::Error> {
        self.run_command(
            id,
            Command::Rename {
                from: oldpath,
                to: newpath,
            },
        )
        .await
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        self.run_command(
            id,
            Command::Other {
                method: "setstat".into(),
                path,
            },
        )
        .await
    }

    async fn symlink(
        &mut self,
        id: u32,
        linkpath: String,
        _targetpath: String,
    ) -> Result<Status, Self::Error> {
        self.run_command(
            id,
            Command::Other {
                method: "symlink".into(),
                path: linkpath,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hinnat_vfs::constants::PRICELIST_FILE;
    use hinnat_vfs::storage::ObjectPricelistStore;
    use hinnat_vfs::storage::mock::RecordingIncomingStore;
    use hinnat_vfs::vfs::Denial;
    use hinnat_vfs::{Backends, Identity};
    use std::sync::Arc;

    fn session() -> (SftpSession, Arc<RecordingIncomingStore>) {
        let incoming = Arc::new(RecordingIncomingStore::new());
        let backends = Backends::new(Arc::new(ObjectPricelistStore::in_memory()), incoming.clone());
        (SftpSession::new(backends.session(Identity::new("alice", "k"))), incoming)
    }

    fn write_flags() -> OpenFlags {
        OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE
    }

    #[test]
    fn test_status_mapping() {
        let denied = VfsError::denied("/etc", Denial::OutsideNamespace);
        assert_eq!(status_for(&denied), StatusCode::PermissionDenied);
        assert_eq!(status_for(&VfsError::not_found("/x")), StatusCode::NoSuchFile);
        assert_eq!(status_for(&VfsError::unsupported("link")), StatusCode::OpUnsupported);
        let oversized = VfsError::SizeLimitExceeded {
            path: "/in/x".into(),
            limit: 1,
        };
        assert_eq!(status_for(&oversized), StatusCode::Failure);
    }

    #[test]
    fn test_attributes() {
        let attrs = attributes(&Entry::directory("in"));
        assert_eq!(attrs.permissions.map(|p| p & 0o170000), Some(0o040000));
        assert_eq!(attrs.size, Some(0));
    }

    #[tokio::test]
    async fn test_upload_flushes_on_close() {
        let (mut sftp, incoming) = session();
        let handle = sftp
            .open(1, "/in/order.txt".into(), write_flags(), FileAttributes::default())
            .await
            .unwrap()
            .handle;
        sftp.write(2, handle.clone(), 5, b"world".to_vec()).await.unwrap();
        sftp.write(3, handle.clone(), 0, b"hello".to_vec()).await.unwrap();
        assert!(incoming.calls().is_empty());

        sftp.close(4, handle).await.unwrap();
        let calls = incoming.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].content, b"helloworld".to_vec());
    }

    #[tokio::test]
    async fn test_reading_incoming_is_permission_denied() {
        let (mut sftp, _) = session();
        let err = sftp
            .open(1, "/in/order.txt".into(), OpenFlags::READ, FileAttributes::default())
            .await
            .unwrap_err();
        assert_eq!(err, StatusCode::PermissionDenied);
    }

    #[tokio::test]
    async fn test_pricelist_read_until_eof() {
        let (mut sftp, _) = session();
        let path = format!("/Hinnat/{}", PRICELIST_FILE);
        let h = sftp
            .open(1, path.clone(), write_flags(), FileAttributes::default())
            .await
            .unwrap()
            .handle;
        sftp.write(2, h.clone(), 0, b"0123456789".to_vec()).await.unwrap();
        sftp.close(3, h).await.unwrap();

        let h = sftp
            .open(4, path, OpenFlags::READ, FileAttributes::default())
            .await
            .unwrap()
            .handle;
        let first = sftp.read(5, h.clone(), 0, 4).await.unwrap();
        assert_eq!(first.data, b"0123".to_vec());
        let rest = sftp.read(6, h.clone(), 4, 100).await.unwrap();
        assert_eq!(rest.data, b"456789".to_vec());
        assert_eq!(sftp.read(7, h.clone(), 10, 4).await.unwrap_err(), StatusCode::Eof);
        sftp.close(8, h).await.unwrap();
    }

    #[tokio::test]
    async fn test_fstat_on_read_handle_matches_stat() {
        let (mut sftp, _) = session();
        let path = format!("/Hinnat/{}", PRICELIST_FILE);
        let h = sftp
            .open(1, path.clone(), write_flags(), FileAttributes::default())
            .await
            .unwrap()
            .handle;
        sftp.write(2, h.clone(), 0, b"0123456789".to_vec()).await.unwrap();
        sftp.close(3, h).await.unwrap();

        // Let the clock move past the upload's second.
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        let h = sftp
            .open(4, path.clone(), OpenFlags::READ, FileAttributes::default())
            .await
            .unwrap()
            .handle;
        let by_handle = sftp.fstat(5, h.clone()).await.unwrap().attrs;
        let by_path = sftp.stat(6, path).await.unwrap().attrs;
        assert_eq!(by_handle.size, Some(10));
        assert_eq!(by_handle.size, by_path.size);
        assert_eq!(by_handle.mtime, by_path.mtime);
        assert_eq!(by_handle.permissions, by_path.permissions);
        sftp.close(7, h).await.unwrap();
    }

    #[tokio::test]
    async fn test_root_directory_listing() {
        let (mut sftp, _) = session();
        let h = sftp.opendir(1, "/".into()).await.unwrap().handle;
        let names: Vec<_> = sftp
            .readdir(2, h.clone())
            .await
            .unwrap()
            .files
            .into_iter()
            .map(|f| f.filename)
            .collect();
        assert_eq!(names, vec!["in", "Hinnat"]);
        assert_eq!(sftp.readdir(3, h).await.unwrap_err(), StatusCode::Eof);
    }

    #[tokio::test]
    async fn test_destructive_requests_denied() {
        let (mut sftp, _) = session();
        assert_eq!(
            sftp.remove(1, "/in/order.txt".into()).await.unwrap_err(),
            StatusCode::PermissionDenied
        );
        assert_eq!(
            sftp.rmdir(2, "/Hinnat".into()).await.unwrap_err(),
            StatusCode::PermissionDenied
        );
        assert_eq!(
            sftp.rename(3, "/Hinnat/a".into(), "/Hinnat/b".into()).await.unwrap_err(),
            StatusCode::PermissionDenied
        );
        assert_eq!(
            sftp.symlink(4, "/Hinnat/link".into(), "/Hinnat/a".into()).await.unwrap_err(),
            StatusCode::OpUnsupported
        );
    }

    #[tokio::test]
    async fn test_outside_paths_denied() {
        let (mut sftp, _) = session();
        assert_eq!(sftp.stat(1, "/etc".into()).await.unwrap_err(), StatusCode::PermissionDenied);
        assert_eq!(
            sftp.opendir(2, "/home".into()).await.unwrap_err(),
            StatusCode::PermissionDenied
        );
        let realpath = sftp.realpath(3, "/in/../Hinnat".into()).await.unwrap();
        assert_eq!(realpath.files[0].filename, "/Hinnat");
    }

    #[tokio::test]
    async fn test_oversized_upload_fails_and_is_not_flushed() {
        let (mut sftp, incoming) = session();
        let h = sftp
            .open(1, "/in/big.txt".into(), write_flags(), FileAttributes::default())
            .await
            .unwrap()
            .handle;
        let chunk = vec![b'x'; 32 * 1024];
        let mut failed = false;
        for i in 0..4u64 {
            if sftp.write(2, h.clone(), i * chunk.len() as u64, chunk.clone()).await.is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed);
        assert_eq!(sftp.close(3, h).await.unwrap_err(), StatusCode::Failure);
        assert!(incoming.calls().is_empty());
    }
}
