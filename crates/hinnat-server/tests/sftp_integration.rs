//! End-to-end tests: real SSH + SFTP client against the gateway
//!
//! Uses an ephemeral host key, an in-memory user database and in-memory
//! storage adapters.

use std::net::SocketAddr;
use std::sync::Arc;

use hinnat_server::{SshServer, SshServerConfig, UserDb};
use hinnat_vfs::constants::PRICELIST_FILE;
use hinnat_vfs::storage::mock::RecordingIncomingStore;
use hinnat_vfs::storage::{ObjectPricelistStore, PricelistStore};
use hinnat_vfs::{Backends, Identity};
use russh::{ChannelMsg, client};
use russh::keys::PublicKey;
use russh_sftp::client::SftpSession;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::StatusCode;
use tokio::io::AsyncWriteExt;

const PRICELIST: &[u8] = b"PK\x03\x04 pricelist for alice";

struct AcceptAnyKey;

impl client::Handler for AcceptAnyKey {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

struct Gateway {
    addr: SocketAddr,
    incoming: Arc<RecordingIncomingStore>,
}

/// Start a gateway on an ephemeral port with user alice/s3cret
async fn start_gateway() -> Gateway {
    let users = UserDb::in_memory().unwrap().with_cost(4);
    users.add_user("alice", "s3cret").unwrap();
    users.add_user("bob", "hunter2").unwrap();
    users.set_active("bob", false).unwrap();

    let pricelist = Arc::new(ObjectPricelistStore::in_memory());
    pricelist
        .upload(&Identity::new("alice", "seed"), PRICELIST_FILE, PRICELIST.to_vec())
        .await
        .unwrap();
    let incoming = Arc::new(RecordingIncomingStore::new());
    let backends = Backends::new(pricelist, incoming.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = SshServerConfig::ephemeral(addr.port()).unwrap();

    tokio::spawn(async move {
        let server = SshServer::new(config, backends, Arc::new(users));
        if let Err(e) = server.serve(listener).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Gateway { addr, incoming }
}

async fn ssh_login(addr: SocketAddr, user: &str, password: &str) -> client::Handle<AcceptAnyKey> {
    let config = Arc::new(client::Config::default());
    let mut session = client::connect(config, addr, AcceptAnyKey).await.unwrap();
    let auth = session.authenticate_password(user, password).await.unwrap();
    assert!(auth.success(), "login failed for {}", user);
    session
}

async fn sftp(addr: SocketAddr) -> (client::Handle<AcceptAnyKey>, SftpSession) {
    let session = ssh_login(addr, "alice", "s3cret").await;
    let channel = session.channel_open_session().await.unwrap();
    channel.request_subsystem(true, "sftp").await.unwrap();
    let sftp = SftpSession::new(channel.into_stream()).await.unwrap();
    (session, sftp)
}

/// Upload through an explicit handle so the close (and flush) completes
/// before returning.
async fn upload(sftp: &SftpSession, path: &str, data: &[u8]) -> std::io::Result<()> {
    let mut file = sftp.create(path).await.map_err(std::io::Error::other)?;
    file.write_all(data).await?;
    file.shutdown().await
}

fn status(err: SftpError) -> StatusCode {
    match err {
        SftpError::Status(status) => status.status_code,
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let gateway = start_gateway().await;
    let config = Arc::new(client::Config::default());
    let mut session = client::connect(config, gateway.addr, AcceptAnyKey).await.unwrap();

    let auth = session.authenticate_password("alice", "wrong").await.unwrap();
    assert!(!auth.success());
    let auth = session.authenticate_password("bob", "hunter2").await.unwrap();
    assert!(!auth.success());
}

#[tokio::test]
async fn test_root_listing() {
    let gateway = start_gateway().await;
    let (_session, sftp) = sftp(gateway.addr).await;

    let names: Vec<String> = sftp
        .read_dir("/")
        .await
        .unwrap()
        .map(|entry| entry.file_name())
        .collect();
    assert_eq!(names, vec!["Hinnat".to_string(), "in".to_string()]);
    assert_eq!(sftp.canonicalize(".").await.unwrap(), "/");
}

#[tokio::test]
async fn test_download_pricelist() {
    let gateway = start_gateway().await;
    let (_session, sftp) = sftp(gateway.addr).await;

    let names: Vec<String> = sftp
        .read_dir("/Hinnat")
        .await
        .unwrap()
        .map(|entry| entry.file_name())
        .collect();
    assert_eq!(names, vec![PRICELIST_FILE.to_string()]);

    let data = sftp.read(format!("/Hinnat/{}", PRICELIST_FILE)).await.unwrap();
    assert_eq!(data, PRICELIST);
}

#[tokio::test]
async fn test_upload_order_is_forwarded() {
    let gateway = start_gateway().await;
    let (_session, sftp) = sftp(gateway.addr).await;

    upload(&sftp, "/in/order-1.csv", b"sku;qty\n100;2\n").await.unwrap();

    let calls = gateway.incoming.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].username, "alice");
    assert_eq!(calls[0].filename, "order-1.csv");
    assert_eq!(calls[0].content, b"sku;qty\n100;2\n");

    // write-only: uploads never come back
    let err = sftp.read("/in/order-1.csv").await.unwrap_err();
    assert_eq!(status(err), StatusCode::PermissionDenied);
}

#[tokio::test]
async fn test_destructive_operations_denied() {
    let gateway = start_gateway().await;
    let (_session, sftp) = sftp(gateway.addr).await;

    let pricelist = format!("/Hinnat/{}", PRICELIST_FILE);
    assert_eq!(
        status(sftp.remove_file(pricelist.clone()).await.unwrap_err()),
        StatusCode::PermissionDenied
    );
    assert_eq!(
        status(sftp.remove_dir("/in").await.unwrap_err()),
        StatusCode::PermissionDenied
    );
    assert_eq!(
        status(sftp.rename(pricelist.clone(), "/in/stolen.zip").await.unwrap_err()),
        StatusCode::PermissionDenied
    );
    assert_eq!(
        status(sftp.read_dir("/etc").await.err().unwrap()),
        StatusCode::PermissionDenied
    );

    // still there afterwards
    assert_eq!(sftp.read(pricelist).await.unwrap(), PRICELIST);
}

#[tokio::test]
async fn test_oversized_upload_is_refused() {
    let gateway = start_gateway().await;
    let (_session, sftp) = sftp(gateway.addr).await;

    let big = vec![b'x'; 100 * 1024 + 1];
    assert!(upload(&sftp, "/in/huge.csv", &big).await.is_err());
    assert!(gateway.incoming.calls().is_empty());
}

#[tokio::test]
async fn test_other_subsystems_refused() {
    let gateway = start_gateway().await;
    let session = ssh_login(gateway.addr, "alice", "s3cret").await;
    let mut channel = session.channel_open_session().await.unwrap();
    channel.request_subsystem(true, "netconf").await.unwrap();

    loop {
        match channel.wait().await {
            Some(ChannelMsg::Failure) => break,
            Some(ChannelMsg::Success) => panic!("netconf subsystem accepted"),
            Some(_) => continue,
            None => panic!("channel closed without a reply"),
        }
    }
}
