//! `ldap-fixture`: run a disposable OpenLDAP server from the command line.

mod cli;
mod telemetry;

use anyhow::Result;
use clap::Parser;
use ldap_fixture_server::{DirectoryServer, LdapServer};
use std::process::ExitCode;
use tracing::{info, warn};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::initialise();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let server = LdapServer::new(cli.into_options()?)?;
    let served = serve(&server).await;
    let stopped = server.shutdown().await;
    served?;
    stopped?;
    Ok(())
}

async fn serve(server: &LdapServer) -> Result<()> {
    server.start().await?;

    println!("LDAP server running at {}", server.uri());
    println!("  suffix: {}", server.suffix());
    println!("  rootdn: {}", server.rootdn());
    println!("  rootpw: {}", server.rootpw());
    if let Some(address) = server.control_address().await {
        println!("  control: http://{address}/");
    }

    tokio::select! {
        interrupted = tokio::signal::ctrl_c() => {
            interrupted?;
            info!("interrupted, shutting down");
        }
        exited = server.wait(None) => {
            exited?;
            warn!("slapd exited on its own");
        }
    }
    Ok(())
}
