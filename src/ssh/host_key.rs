// 主机密钥校验策略
use log::warn;
use ssh2::{CheckResult, HostKeyType, KnownHostFileKind, Session};
use std::path::PathBuf;

/// Decides whether the key presented by a server is trusted.
pub trait HostKeyPolicy: Send + Sync {
    fn verify(&self, host: &str, port: u16, key: &[u8], key_type: HostKeyType) -> bool;
}

/// Trusts every server key.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAnyHostKey;

impl HostKeyPolicy for AcceptAnyHostKey {
    fn verify(&self, _host: &str, _port: u16, _key: &[u8], _key_type: HostKeyType) -> bool {
        true
    }
}

/// Trusts only keys listed in an OpenSSH `known_hosts` file.
#[derive(Debug, Clone)]
pub struct KnownHostsFile {
    path: PathBuf,
}

impl KnownHostsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn check(&self, host: &str, port: u16, key: &[u8]) -> Result<CheckResult, ssh2::Error> {
        let session = Session::new()?;
        let mut known_hosts = session.known_hosts()?;
        known_hosts.read_file(&self.path, KnownHostFileKind::OpenSSH)?;
        Ok(known_hosts.check_port(host, port, key))
    }
}

impl HostKeyPolicy for KnownHostsFile {
    fn verify(&self, host: &str, port: u16, key: &[u8], _key_type: HostKeyType) -> bool {
        match self.check(host, port, key) {
            Ok(CheckResult::Match) => true,
            Ok(CheckResult::Mismatch) => {
                warn!("Host key for {}:{} does not match {}", host, port, self.path.display());
                false
            }
            Ok(CheckResult::NotFound) => {
                warn!("Host {}:{} not found in {}", host, port, self.path.display());
                false
            }
            Ok(CheckResult::Failure) => false,
            Err(e) => {
                warn!("Cannot read {}: {}", self.path.display(), e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_any() {
        assert!(AcceptAnyHostKey.verify("example.com", 22, b"key", HostKeyType::Rsa));
    }

    #[test]
    fn test_missing_known_hosts_rejects() {
        let policy = KnownHostsFile::new("/nonexistent/ssh-exec/known_hosts");
        assert!(!policy.verify("example.com", 22, b"key", HostKeyType::Rsa));
    }
}
