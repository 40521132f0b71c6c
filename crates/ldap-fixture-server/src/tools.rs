//! Directory operations carried out by the OpenLDAP command-line clients.

use async_trait::async_trait;
use ldap_fixture_core::ldif::{self, Entry, Snapshot};
use ldap_fixture_core::server::normalize_dn;
use ldap_fixture_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::ServerConfig;
use crate::paths::ToolPaths;

/// Exit code of the OpenLDAP clients for `noSuchObject`.
pub const LDAP_NO_SUCH_OBJECT: i32 = 32;

/// One command-line invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Executable to run
    pub program: PathBuf,
    /// Arguments, not including the program
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Bytes written to standard input
    pub stdin: Option<Vec<u8>>,
}

impl ToolInvocation {
    /// Short tool name used in logs and errors.
    #[must_use]
    pub fn name(&self) -> String {
        tool_name(&self.program)
    }
}

/// Captured result of a finished invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` if killed by a signal
    pub code: Option<i32>,
    /// Standard output
    pub stdout: Vec<u8>,
    /// Standard error
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    /// Whether the tool exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Converts a failed run into [`Error::ToolFailed`].
    #[must_use]
    pub fn into_error(self, tool: impl Into<String>) -> Error {
        Error::ToolFailed {
            tool: tool.into(),
            code: self.code,
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
        }
    }
}

/// Runs external programs to completion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Runs the invocation and captures its output.
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;
}

/// [`ToolRunner`] that spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemToolRunner;

#[async_trait]
impl ToolRunner for SystemToolRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|err| {
            Error::Io(format!("failed to run {}: {err}", invocation.program.display()))
        })?;

        // Feed stdin while draining stdout so neither pipe can fill up.
        let stdin = child.stdin.take();
        let feed = async {
            if let (Some(mut stdin), Some(input)) = (stdin, &invocation.stdin) {
                stdin.write_all(input).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        match fed {
            // The exit code tells the story when the tool stops reading early.
            Err(err) if err.kind() != std::io::ErrorKind::BrokenPipe => return Err(err.into()),
            _ => {}
        }
        Ok(ToolOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Adds, reads and clears entries of a running server.
///
/// Holds no connection; every call is a fresh tool invocation authenticated
/// as the admin user.
#[derive(Clone)]
pub struct DirectoryClient {
    runner: Arc<dyn ToolRunner>,
    tools: ToolPaths,
    uri: String,
    suffix: String,
    rootdn: String,
    rootpw: String,
    ca_bundle: Option<PathBuf>,
}

impl std::fmt::Debug for DirectoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryClient")
            .field("uri", &self.uri)
            .field("suffix", &self.suffix)
            .field("rootdn", &self.rootdn)
            .finish_non_exhaustive()
    }
}

impl DirectoryClient {
    /// Creates a client for the server described by `config`.
    ///
    /// `ca_bundle` is the trust root the tools verify `ldaps://` against.
    #[must_use]
    pub fn new(runner: Arc<dyn ToolRunner>, config: &ServerConfig, ca_bundle: Option<PathBuf>) -> Self {
        Self {
            runner,
            tools: config.tools.clone(),
            uri: config.uri(),
            suffix: config.suffix.to_string(),
            rootdn: config.rootdn.clone(),
            rootpw: config.rootpw.clone(),
            ca_bundle,
        }
    }

    /// Adds entries, parents first, with DNs completed against the suffix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LdifFormat`] if two DNs name the same entry once the
    /// suffix is appended, or [`Error::ToolFailed`] if `ldapadd` rejects the data.
    pub async fn add(&self, data: &Snapshot) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let data = data.clone().map_dns(|dn| normalize_dn(dn, &self.suffix))?;
        let mut invocation = self.invocation(&self.tools.ldapadd, Vec::new());
        invocation.stdin = Some(ldif::encode(&data)?.into_bytes());

        let output = self.run(&invocation).await?;
        if output.success() {
            Ok(())
        } else {
            Err(output.into_error(invocation.name()))
        }
    }

    /// Reads one entry; the suffix may be omitted from `dn`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry does not exist.
    pub async fn get(&self, dn: &str) -> Result<Entry> {
        let dn = normalize_dn(dn, &self.suffix);
        let invocation = self.search(&dn, "base", &[]);
        let output = self.run(&invocation).await?;

        match output.code {
            Some(0) => {}
            Some(LDAP_NO_SUCH_OBJECT) => return Err(Error::NotFound(dn)),
            _ => return Err(output.into_error(invocation.name())),
        }

        let snapshot = ldif::decode(&output.stdout)?;
        if snapshot.len() != 1 {
            return Err(Error::LdifFormat(format!(
                "expected one entry for {dn}, ldapsearch returned {}",
                snapshot.len()
            )));
        }
        snapshot
            .into_iter()
            .next()
            .map(|(_, entry)| entry)
            .ok_or(Error::NotFound(dn))
    }

    /// Deletes every entry under and including the suffix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolFailed`] if the search or the deletion fails.
    pub async fn clear(&self) -> Result<()> {
        let invocation = self.search(&self.suffix, "sub", &["dn"]);
        let output = self.run(&invocation).await?;
        match output.code {
            Some(0) => {}
            Some(LDAP_NO_SUCH_OBJECT) => {
                debug!(suffix = %self.suffix, "nothing to clear");
                return Ok(());
            }
            _ => return Err(output.into_error(invocation.name())),
        }

        let dns = ldif::decode(&output.stdout)?.deletion_order();
        if dns.is_empty() {
            return Ok(());
        }

        let invocation = self.invocation(&self.tools.ldapdelete, dns);
        let output = self.run(&invocation).await?;
        if output.success() {
            Ok(())
        } else {
            Err(output.into_error(invocation.name()))
        }
    }

    fn search(&self, base: &str, scope: &str, attributes: &[&str]) -> ToolInvocation {
        let mut args: Vec<String> = ["-LLL", "-o", "ldif-wrap=no", "-b", base, "-s", scope]
            .iter()
            .map(ToString::to_string)
            .collect();
        args.extend(attributes.iter().map(ToString::to_string));
        self.invocation(&self.tools.ldapsearch, args)
    }

    fn invocation(&self, program: &Path, extra: Vec<String>) -> ToolInvocation {
        let mut args = vec![
            "-x".to_string(),
            "-D".to_string(),
            self.rootdn.clone(),
            "-w".to_string(),
            self.rootpw.clone(),
            "-H".to_string(),
            self.uri.clone(),
        ];
        args.extend(extra);

        let env = self
            .ca_bundle
            .as_ref()
            .map(|ca| {
                vec![
                    ("LDAPTLS_CACERT".to_string(), ca.display().to_string()),
                    ("LDAPTLS_REQCERT".to_string(), "hard".to_string()),
                ]
            })
            .unwrap_or_default();

        ToolInvocation {
            program: program.to_path_buf(),
            args,
            env,
            stdin: None,
        }
    }

    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        debug!(tool = %invocation.name(), args = ?invocation.args.get(7..), "running tool");
        let output = self.runner.run(invocation).await?;
        debug!(tool = %invocation.name(), code = ?output.code, "tool finished");
        Ok(output)
    }
}

/// File name of `program`, falling back to the full path.
#[must_use]
pub fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map_or_else(|| program.display().to_string(), |name| name.to_string_lossy().into_owned())
}
