// 配置管理
use crate::cli::Cli;
use crate::utils::error::{Result as SshResult, SshError};
use anyhow::{Context, Result};
use dialoguer::{Confirm, Password};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_CHUNK_SIZE: usize = 1024;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Password(String),
    PublicKey {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

impl AuthMethod {
    /// Picks the authentication method from optional credentials.
    ///
    /// A key file wins over a password when both are present.
    pub fn resolve(
        password: Option<String>,
        key_path: Option<PathBuf>,
        passphrase: Option<String>,
    ) -> SshResult<Self> {
        match (key_path, password) {
            (Some(path), _) => Ok(AuthMethod::PublicKey { path, passphrase }),
            (None, Some(password)) => Ok(AuthMethod::Password(password)),
            (None, None) => Err(SshError::MissingCredentials),
        }
    }
}

// 不输出密码和口令
impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password(_) => f.write_str("Password(***)"),
            AuthMethod::PublicKey { path, passphrase } => f
                .debug_struct("PublicKey")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "***"))
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,
    pub timeout: Duration,
}

impl ConnectOptions {
    pub fn new(username: impl Into<String>, host: impl Into<String>, auth: AuthMethod) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: username.into(),
            auth,
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Tuning for command execution and the background worker.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Upper bound of a single read from the channel.
    pub chunk_size: usize,
    /// Pause between polls while the remote command is still running.
    pub poll_interval: Duration,
    /// Overall limit for one command. `None` waits as long as the command runs.
    pub exec_timeout: Option<Duration>,
    /// Pending submissions accepted before `submit_*` blocks.
    pub queue_capacity: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            exec_timeout: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub connect: ConnectOptions,
    pub exec: ExecOptions,
    pub known_hosts: Option<PathBuf>,
    pub commands: Vec<String>,
    pub json: bool,
    pub verbose: bool,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let auth = Self::determine_auth_method(cli)?;

        let connect = ConnectOptions::new(cli.username.clone(), cli.host.clone(), auth)
            .port(cli.port)
            .timeout(Duration::from_millis(cli.connect_timeout));

        let exec = ExecOptions {
            poll_interval: Duration::from_millis(cli.poll_interval),
            exec_timeout: cli.exec_timeout.map(Duration::from_secs),
            ..ExecOptions::default()
        };

        Ok(Config {
            connect,
            exec,
            known_hosts: cli.known_hosts.clone(),
            commands: cli.commands.clone(),
            json: cli.json,
            verbose: cli.verbose,
        })
    }

    fn determine_auth_method(cli: &Cli) -> Result<AuthMethod> {
        // 命令行提供了密钥或密码，直接使用（密钥优先）
        if cli.key_file.is_some() || cli.password.is_some() {
            return AuthMethod::resolve(
                cli.password.clone(),
                cli.key_file.clone(),
                cli.passphrase.clone(),
            )
            .context("Invalid credentials");
        }

        // 尝试查找默认的SSH密钥
        let home = home::home_dir().context("Cannot determine home directory")?;
        let ssh_dir = home.join(".ssh");

        let key_files = ["id_ed25519", "id_ecdsa", "id_rsa"];
        for key_name in &key_files {
            let key_path = ssh_dir.join(key_name);
            if key_path.exists() {
                let use_key = Confirm::new()
                    .with_prompt(format!("Use SSH key {} for authentication?", key_path.display()))
                    .default(true)
                    .interact()?;

                if use_key {
                    return Ok(AuthMethod::PublicKey {
                        path: key_path,
                        passphrase: cli.passphrase.clone(),
                    });
                }
            }
        }

        let password = Password::new()
            .with_prompt(format!("Enter password for {}@{}", cli.username, cli.host))
            .interact()?;

        Ok(AuthMethod::Password(password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_file_wins_over_password() {
        let auth = AuthMethod::resolve(
            Some("secret".to_string()),
            Some(PathBuf::from("/home/romain/.ssh/id_ed25519")),
            None,
        )
        .unwrap();

        assert_eq!(
            auth,
            AuthMethod::PublicKey {
                path: PathBuf::from("/home/romain/.ssh/id_ed25519"),
                passphrase: None,
            }
        );
    }

    #[test]
    fn test_password_only() {
        let auth = AuthMethod::resolve(Some("secret".to_string()), None, None).unwrap();
        assert_eq!(auth, AuthMethod::Password("secret".to_string()));
    }

    #[test]
    fn test_no_credentials() {
        let err = AuthMethod::resolve(None, None, Some("ignored".to_string())).unwrap_err();
        assert!(matches!(err, SshError::MissingCredentials));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let auth = AuthMethod::PublicKey {
            path: PathBuf::from("id_rsa"),
            passphrase: Some("coucou".to_string()),
        };
        let rendered = format!("{:?} {:?}", auth, AuthMethod::Password("hunter2".to_string()));
        assert!(!rendered.contains("coucou"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_connect_defaults() {
        let options = ConnectOptions::new("romain", "192.168.56.101", AuthMethod::Password("x".into()));
        assert_eq!(options.port, 22);
        assert_eq!(options.timeout, Duration::from_millis(5000));
        assert_eq!(options.address(), "192.168.56.101:22");

        let exec = ExecOptions::default();
        assert_eq!(exec.chunk_size, 1024);
        assert_eq!(exec.poll_interval, Duration::from_secs(1));
        assert!(exec.exec_timeout.is_none());
    }
}
