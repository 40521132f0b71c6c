//! Lifecycle tests against shell scripts standing in for the OpenLDAP tools.

use ldap_fixture_control::ProxyServer;
use ldap_fixture_server::{DirectoryServer, Error, LdapServer, ServerOptions, Snapshot};
use std::fs;
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const SEARCH_OUTPUT: &str = "dn: dc=example,dc=org\nobjectClass: dcObject\nobjectClass: organization\ndc: example\no: dc=example,dc=org\n\n";

struct FakeInstall {
    root: TempDir,
}

impl FakeInstall {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("bin")).unwrap();
        fs::create_dir_all(root.path().join("schema")).unwrap();
        fs::write(root.path().join("schema/core.schema"), "").unwrap();

        let install = Self { root };
        install.tool("slapd", "exec sleep 30");
        install.tool(
            "slaptest",
            &format!("echo \"$2\" > {}", install.marker("slaptest").display()),
        );
        install.tool(
            "ldapadd",
            &format!("cat >> {}", install.marker("ldapadd").display()),
        );
        install.tool(
            "ldapsearch",
            &format!("printf '%s' '{SEARCH_OUTPUT}'"),
        );
        install.tool(
            "ldapdelete",
            &format!("echo \"$@\" >> {}", install.marker("ldapdelete").display()),
        );
        install
    }

    fn tool(&self, name: &str, body: &str) {
        let path = self.root.path().join("bin").join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn marker(&self, name: &str) -> PathBuf {
        self.root.path().join(format!("{name}.out"))
    }

    fn read_marker(&self, name: &str) -> String {
        fs::read_to_string(self.marker(name)).unwrap_or_default()
    }

    fn options(&self) -> ServerOptions {
        ServerOptions::new()
            .with_host("127.0.0.1")
            .with_rootpw("secret")
            .with_startup_timeout(Duration::from_secs(1))
            .with_binary_dirs(vec![self.root.path().join("bin")])
            .with_schema_dirs(vec![self.root.path().join("schema")])
    }

    /// Workspace of the last start, read back from what slaptest was given.
    fn last_workspace(&self) -> PathBuf {
        let conf = self.read_marker("slaptest");
        Path::new(conf.trim()).parent().unwrap().to_path_buf()
    }
}

#[tokio::test]
async fn rejected_configuration_leaves_nothing_behind() {
    let install = FakeInstall::new();
    install.tool(
        "slaptest",
        &format!(
            "echo \"$2\" > {}; echo 'bad config' >&2; exit 1",
            install.marker("slaptest").display()
        ),
    );

    let server = LdapServer::new(install.options()).unwrap();
    let err = server.start().await.unwrap_err();

    assert!(matches!(err, Error::ConfigError(ref message) if message.contains("bad config")));
    assert!(!install.last_workspace().exists());
    assert!(!server.is_running().await);
}

#[tokio::test]
async fn slapd_exiting_early_leaves_nothing_behind() {
    let install = FakeInstall::new();
    install.tool("slapd", "exit 1");

    let server = LdapServer::new(install.options()).unwrap();
    let err = server.start().await.unwrap_err();

    assert!(matches!(err, Error::StartupFailed(_)));
    assert!(!install.last_workspace().exists());
    assert!(!server.is_running().await);
}

#[tokio::test]
async fn slapd_never_listening_times_out() {
    let install = FakeInstall::new();

    let server = LdapServer::new(install.options()).unwrap();
    let err = server.start().await.unwrap_err();

    assert!(matches!(err, Error::StartupFailed(ref message) if message.contains("within")));
    assert!(!install.last_workspace().exists());
    assert!(server.pid().await.is_none());
}

#[tokio::test]
async fn full_lifecycle_with_fake_tools() {
    let install = FakeInstall::new();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let initial = ldap_fixture_core::ldif::decode(
        "version: 1\n\ndn: ou=people\nobjectClass: organizationalUnit\nou: people\n",
    )
    .unwrap();
    let server = LdapServer::new(install.options().with_port(port).with_initial_data(initial))
        .unwrap();

    server.start().await.unwrap();
    assert!(server.is_running().await);
    let workspace = server.workspace_path().await.unwrap();
    assert_eq!(workspace, install.last_workspace());
    assert!(workspace.join("slapd.conf").is_file());
    assert!(workspace.join("ldif-data").is_dir());

    let added = install.read_marker("ldapadd");
    assert!(added.contains("dn: dc=example,dc=org\n"));
    assert!(added.contains("dn: ou=people,dc=example,dc=org\n"));

    let root = server.get("dc=example,dc=org").await.unwrap();
    assert_eq!(root.first_str("dc"), Some("example"));
    assert_eq!(
        server.get_ldif("dc=example,dc=org").await.unwrap(),
        "version: 1\n\ndn: dc=example,dc=org\ndc: example\no: dc=example,dc=org\n\
         objectClass: dcObject\nobjectClass: organization\n"
    );

    server.reset().await.unwrap();
    assert_eq!(
        install.read_marker("ldapdelete").trim_end(),
        format!("-x -D cn=testadmin,dc=example,dc=org -w secret -H ldap://127.0.0.1:{port} dc=example,dc=org")
    );

    server.stop().await.unwrap();
    assert!(!workspace.exists());
    assert!(!server.is_running().await);
    server.stop().await.unwrap();
    server.wait(Some(Duration::from_millis(10))).await.unwrap();
}

#[tokio::test]
async fn wait_times_out_while_running() {
    let install = FakeInstall::new();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = LdapServer::new(install.options().with_port(port)).unwrap();

    server.start().await.unwrap();
    let err = server
        .wait(Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    server.stop().await.unwrap();
}

#[tokio::test]
async fn control_endpoint_follows_server() {
    let install = FakeInstall::new();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = LdapServer::new(
        install
            .options()
            .with_port(port)
            .with_control_address("127.0.0.1:0"),
    )
    .unwrap();

    assert!(server.control_address().await.is_none());
    server.start().await.unwrap();
    let address = server.control_address().await.unwrap();

    let proxy = ProxyServer::connect(&format!("http://{address}/")).await.unwrap();
    assert_eq!(proxy.uri(), server.uri());
    assert_eq!(proxy.rootpw(), "secret");
    assert_eq!(
        proxy.get("dc=example,dc=org").await.unwrap(),
        server.get("dc=example,dc=org").await.unwrap()
    );
    proxy.add(&Snapshot::new()).await.unwrap();

    proxy.stop().await.unwrap();
    assert!(!server.is_running().await);
    assert!(matches!(
        proxy.reset().await,
        Err(Error::RemoteFailure { status: 500, .. })
    ));

    server.shutdown().await.unwrap();
    assert!(ProxyServer::connect(&format!("http://{address}/")).await.is_err());
}
