// SSH客户端封装（基于 ssh2 / libssh2）
use crate::config::{AuthMethod, ConnectOptions};
use crate::ssh::host_key::HostKeyPolicy;
use crate::ssh::transport::{CommandChannel, Transport, TransportSession};
use crate::utils::error::{Result, SshError};
use log::{debug, info};
use ssh2::{Channel, ErrorCode, ExtendedData, Session};
use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

// libssh2 的 LIBSSH2_ERROR_TIMEOUT / LIBSSH2_ERROR_EAGAIN
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_EAGAIN: i32 = -37;
const PUMP_CHUNK: usize = 16 * 1024;

/// Connects to SSH servers through libssh2.
pub struct SshClient {
    host_keys: Box<dyn HostKeyPolicy>,
}

impl SshClient {
    pub fn new(host_keys: impl HostKeyPolicy + 'static) -> Self {
        Self {
            host_keys: Box::new(host_keys),
        }
    }

    fn open_tcp(options: &ConnectOptions) -> Result<TcpStream> {
        let addrs = (options.host.as_str(), options.port)
            .to_socket_addrs()
            .map_err(|e| connection_error(options, format!("cannot resolve host: {e}")))?;

        connect_within(addrs, options.timeout).map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut => timeout_error(options),
            _ => connection_error(options, e),
        })
    }

    fn verify_host_key(&self, session: &Session, options: &ConnectOptions) -> Result<()> {
        let (key, key_type) = session
            .host_key()
            .ok_or_else(|| connection_error(options, "server sent no host key"))?;

        if self.host_keys.verify(&options.host, options.port, key, key_type) {
            Ok(())
        } else {
            Err(SshError::HostKeyRejected {
                host: options.host.clone(),
                port: options.port,
            })
        }
    }

    fn authenticate(session: &Session, options: &ConnectOptions) -> Result<()> {
        let outcome = match &options.auth {
            AuthMethod::PublicKey { path, passphrase } => {
                debug!("Authenticating with SSH key: {}", path.display());
                session.userauth_pubkey_file(
                    &options.username,
                    None,
                    path,
                    Some(passphrase.as_deref().unwrap_or("")),
                )
            }
            AuthMethod::Password(password) => {
                debug!("Authenticating with password...");
                session.userauth_password(&options.username, password)
            }
        };

        match outcome {
            Err(e) if is_timeout(&e) => return Err(timeout_error(options)),
            Err(e) => debug!("Authentication rejected: {}", e),
            Ok(()) => {}
        }

        if !session.authenticated() {
            return Err(SshError::AuthenticationFailed {
                username: options.username.clone(),
            });
        }
        Ok(())
    }
}

impl Transport for SshClient {
    type Session = SshConnection;

    fn connect(&self, options: &ConnectOptions) -> Result<SshConnection> {
        info!("Connecting to {}@{}...", options.username, options.address());

        let tcp = Self::open_tcp(options)?;
        let mut session = Session::new().map_err(|e| connection_error(options, e))?;
        session.set_tcp_stream(tcp);

        // 超时仅作用于握手和认证阶段
        session.set_timeout(u32::try_from(options.timeout.as_millis()).unwrap_or(u32::MAX));
        session.handshake().map_err(|e| ssh_connect_error(options, e))?;
        self.verify_host_key(&session, options)?;
        Self::authenticate(&session, options)?;
        session.set_timeout(0);

        info!("Connected to {}", options.address());
        Ok(SshConnection {
            session,
            host: options.host.clone(),
            port: options.port,
        })
    }
}

/// An authenticated libssh2 session.
pub struct SshConnection {
    session: Session,
    host: String,
    port: u16,
}

impl TransportSession for SshConnection {
    type Channel = ExecChannel;

    fn open_channel(&mut self, command: &str) -> Result<ExecChannel> {
        self.session.set_blocking(true);
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| SshError::execution(command, format!("Failed to create SSH channel: {e}")))?;

        // 只收集标准输出
        channel
            .handle_extended_data(ExtendedData::Ignore)
            .map_err(|e| SshError::execution(command, e))?;

        Ok(ExecChannel {
            session: self.session.clone(),
            channel,
            command: command.to_string(),
            pending: Vec::new(),
            connected: false,
            remote_closed: false,
        })
    }

    fn disconnect(&mut self) -> Result<()> {
        self.session.set_blocking(true);
        self.session
            .disconnect(None, "closed by client", None)
            .map_err(|e| SshError::Connection {
                host: self.host.clone(),
                port: self.port,
                message: format!("disconnect failed: {e}"),
            })
    }
}

/// Exec channel polled in non-blocking mode.
///
/// libssh2 only moves incoming packets into the channel buffer while a call
/// touches the socket, so [`available`](CommandChannel::available) performs one
/// non-blocking read into `pending` and the reader is served from there.
/// Nothing on this channel blocks once the command has been sent.
pub struct ExecChannel {
    session: Session,
    channel: Channel,
    command: String,
    pending: Vec<u8>,
    connected: bool,
    remote_closed: bool,
}

impl ExecChannel {
    fn pump(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; PUMP_CHUNK];
        match self.channel.read(&mut chunk) {
            Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

impl CommandChannel for ExecChannel {
    fn connect(&mut self) -> Result<()> {
        self.channel
            .exec(&self.command)
            .map_err(|e| SshError::execution(&self.command, format!("Failed to execute command: {e}")))?;
        self.session.set_blocking(false);
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn available(&mut self) -> io::Result<usize> {
        if self.pending.is_empty() {
            self.pump()?;
        }
        Ok(self.pending.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            self.pump()?;
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn is_closed(&mut self) -> bool {
        // EOF 之后 exit-status 可能还在路上，等对端的 CLOSE 才算结束
        if !self.remote_closed && self.channel.eof() {
            self.remote_closed = remote_close_seen(&self.command, self.channel.wait_close());
        }
        self.remote_closed
    }

    fn exit_status(&mut self) -> io::Result<i32> {
        Ok(self.channel.exit_status()?)
    }

    fn close(&mut self) -> io::Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        // 只发送 CLOSE，不等待对端回应
        match self.channel.close() {
            Err(e) if !is_would_block(&e) => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Tries each address in turn; `timeout` bounds all attempts together.
fn connect_within(
    addrs: impl IntoIterator<Item = SocketAddr>,
    timeout: Duration,
) -> io::Result<TcpStream> {
    let deadline = Instant::now() + timeout;
    let mut last_error = None;

    for addr in addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"));
        }
        match TcpStream::connect_timeout(&addr, remaining) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("Connecting to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address found")))
}

fn is_timeout(error: &ssh2::Error) -> bool {
    matches!(error.code(), ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT))
}

fn is_would_block(error: &ssh2::Error) -> bool {
    matches!(error.code(), ErrorCode::Session(LIBSSH2_ERROR_EAGAIN))
}

/// Outcome of a non-blocking `wait_close`: `false` while the CLOSE is still pending.
fn remote_close_seen(command: &str, outcome: std::result::Result<(), ssh2::Error>) -> bool {
    match outcome {
        Ok(()) => true,
        Err(e) if is_would_block(&e) => false,
        Err(e) => {
            debug!("'{}': channel broke while closing: {}", command, e);
            true
        }
    }
}

fn ssh_connect_error(options: &ConnectOptions, error: ssh2::Error) -> SshError {
    if is_timeout(&error) {
        timeout_error(options)
    } else {
        connection_error(options, format!("SSH handshake failed: {error}"))
    }
}

fn timeout_error(options: &ConnectOptions) -> SshError {
    SshError::ConnectTimeout {
        host: options.host.clone(),
        port: options.port,
        timeout: options.timeout,
    }
}

fn connection_error(options: &ConnectOptions, message: impl std::fmt::Display) -> SshError {
    SshError::Connection {
        host: options.host.clone(),
        port: options.port,
        message: message.to_string(),
    }
}
