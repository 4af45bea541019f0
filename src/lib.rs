// 库文件，导出模块
pub mod cli;
pub mod config;
pub mod ssh;
pub mod threadpool;
pub mod utils;

use anyhow::{Context, Result};
use config::Config;
use log::warn;
use ssh::{AcceptAnyHostKey, CommandResult, KnownHostsFile, RemoteShell, SshService};

/// Connects with `config`, runs its commands as one background batch and closes the session.
pub fn run_commands(config: Config) -> Result<Vec<CommandResult>> {
    let service = match &config.known_hosts {
        Some(path) => SshService::ssh(KnownHostsFile::new(path), config.exec.clone()),
        None => {
            warn!("No known_hosts file given, accepting any host key");
            SshService::ssh(AcceptAnyHostKey, config.exec.clone())
        }
    };

    service
        .connect(config.connect.clone())
        .with_context(|| format!("Failed to connect to {}", config.connect.address()))?;

    let outcome = service.submit_commands(config.commands.clone()).wait();

    if let Err(e) = service.close() {
        warn!("Failed to close SSH session: {}", e);
    }

    outcome.context("Command execution failed")
}
