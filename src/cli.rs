// 命令行参数解析
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ssh-exec")]
#[command(about = "Run commands on a remote host over SSH")]
#[command(version = "0.1.0")]
pub struct Cli {
    /// SSH server hostname or IP address
    #[arg(short = 'H', long)]
    pub host: String,

    /// SSH server port
    #[arg(short, long, default_value = "22")]
    pub port: u16,

    /// SSH username
    #[arg(short, long)]
    pub username: String,

    /// SSH password (ignored when a key file is given)
    #[arg(short = 'P', long)]
    pub password: Option<String>,

    /// SSH private key file path
    #[arg(short, long)]
    pub key_file: Option<PathBuf>,

    /// Passphrase of the private key
    #[arg(long)]
    pub passphrase: Option<String>,

    /// Connection timeout in milliseconds
    #[arg(long, default_value = "5000")]
    pub connect_timeout: u64,

    /// Interval between output polls in milliseconds
    #[arg(long, default_value = "1000")]
    pub poll_interval: u64,

    /// Abort a command after this many seconds
    #[arg(long)]
    pub exec_timeout: Option<u64>,

    /// known_hosts file used to verify the server key (any key is accepted otherwise)
    #[arg(long)]
    pub known_hosts: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Commands to execute, in order
    #[arg(required = true)]
    pub commands: Vec<String>,
}
