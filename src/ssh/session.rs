// SSH会话管理：连接、执行、后台提交、关闭
use crate::config::{AuthMethod, ConnectOptions, ExecOptions};
use crate::ssh::client::SshClient;
use crate::ssh::executor;
use crate::ssh::host_key::HostKeyPolicy;
use crate::ssh::reader::{interrupt_pair, InterruptHandle, InterruptSignal};
use crate::ssh::result::CommandResult;
use crate::ssh::transport::{Transport, TransportSession};
use crate::threadpool::{TaskHandle, ThreadPool};
use crate::utils::error::{Result, SshError};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The minimal contract of a remote shell.
pub trait RemoteShell {
    /// Opens the session, replacing any live one.
    fn connect(&self, options: ConnectOptions) -> Result<()>;

    fn execute_command(&self, command: &str) -> Result<CommandResult>;

    /// Closes the session. Closing twice is not an error.
    fn close(&self) -> Result<()>;
}

/// Connects with a password on the default port and timeout.
pub fn connect_with_password<S: RemoteShell + ?Sized>(
    shell: &S,
    username: &str,
    host: &str,
    password: &str,
) -> Result<()> {
    shell.connect(ConnectOptions::new(
        username,
        host,
        AuthMethod::Password(password.to_string()),
    ))
}

/// Connects with a private key on the default port and timeout.
pub fn connect_with_key<S: RemoteShell + ?Sized>(
    shell: &S,
    username: &str,
    host: &str,
    key_path: impl Into<PathBuf>,
    passphrase: Option<&str>,
) -> Result<()> {
    let auth = AuthMethod::PublicKey {
        path: key_path.into(),
        passphrase: passphrase.map(str::to_string),
    };
    shell.connect(ConnectOptions::new(username, host, auth))
}

struct LiveSession<S> {
    session: S,
    interrupt: InterruptSignal,
}

struct Shared<T: Transport> {
    transport: T,
    exec: ExecOptions,
    // 持锁期间最多只有一个执行通道
    session: Mutex<Option<LiveSession<T::Session>>>,
    interrupt: Mutex<Option<InterruptHandle>>,
    // 串行化 connect，避免并发连接互相覆盖而泄漏会话
    connecting: Mutex<()>,
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Transport> Shared<T> {
    fn connect(&self, options: &ConnectOptions) -> Result<()> {
        let _connecting = lock(&self.connecting);
        if let Err(e) = self.close() {
            warn!("Failed to close previous session: {}", e);
        }

        let session = self.transport.connect(options)?;
        let (handle, signal) = interrupt_pair();

        let mut live = lock(&self.session);
        *lock(&self.interrupt) = Some(handle);
        *live = Some(LiveSession {
            session,
            interrupt: signal,
        });
        Ok(())
    }

    fn execute_all<C: AsRef<str>>(&self, commands: &[C]) -> Result<Vec<CommandResult>> {
        let mut guard = lock(&self.session);
        let live = guard.as_mut().ok_or(SshError::NotConnected)?;

        commands
            .iter()
            .map(|command| {
                executor::execute_command(
                    &mut live.session,
                    command.as_ref(),
                    &self.exec,
                    &live.interrupt,
                )
            })
            .collect()
    }

    fn execute(&self, command: &str) -> Result<CommandResult> {
        let mut results = self.execute_all(&[command])?;
        Ok(results.remove(0))
    }

    fn close(&self) -> Result<()> {
        // 先中断正在等待的命令，使其释放会话锁
        if let Some(handle) = lock(&self.interrupt).take() {
            handle.fire();
        }

        let Some(mut live) = lock(&self.session).take() else {
            return Ok(());
        };
        info!("Closing SSH session");
        live.session.disconnect()
    }

    fn is_connected(&self) -> bool {
        lock(&self.session).is_some()
    }
}

/// Runs commands on one remote host, in the foreground or on a background worker.
///
/// Every execution holds the session for the whole lifetime of its channel,
/// so channels never overlap on the session.
pub struct SshService<T: Transport = SshClient> {
    shared: Arc<Shared<T>>,
    pool: ThreadPool,
}

impl SshService<SshClient> {
    /// Service over libssh2 verifying server keys with `host_keys`.
    pub fn ssh(host_keys: impl HostKeyPolicy + 'static, exec: ExecOptions) -> Self {
        Self::new(SshClient::new(host_keys), exec)
    }
}

impl<T: Transport> SshService<T> {
    pub fn new(transport: T, exec: ExecOptions) -> Self {
        let pool = ThreadPool::new(1, exec.queue_capacity);
        Self {
            shared: Arc::new(Shared {
                transport,
                exec,
                session: Mutex::new(None),
                interrupt: Mutex::new(None),
                connecting: Mutex::new(()),
            }),
            pool,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Runs `command` on the background worker.
    pub fn submit_command(&self, command: impl Into<String>) -> TaskHandle<CommandResult> {
        let command = command.into();
        let shared = Arc::clone(&self.shared);
        debug!("Submitting '{}'", command);
        self.pool.submit(move || shared.execute(&command))
    }

    /// Runs `commands` in order on the background worker.
    ///
    /// The first failure fails the whole batch; later commands are not run
    /// and results of earlier ones are dropped.
    pub fn submit_commands<I, S>(&self, commands: I) -> TaskHandle<Vec<CommandResult>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let commands: Vec<String> = commands.into_iter().map(Into::into).collect();
        let shared = Arc::clone(&self.shared);
        debug!("Submitting batch of {} commands", commands.len());
        self.pool.submit(move || shared.execute_all(&commands))
    }
}

impl<T: Transport> RemoteShell for SshService<T> {
    fn connect(&self, options: ConnectOptions) -> Result<()> {
        self.shared.connect(&options)
    }

    fn execute_command(&self, command: &str) -> Result<CommandResult> {
        self.shared.execute(command)
    }

    fn close(&self) -> Result<()> {
        self.shared.close()
    }
}

impl<T: Transport> Drop for SshService<T> {
    fn drop(&mut self) {
        if let Err(e) = self.shared.close() {
            warn!("Failed to close SSH session: {}", e);
        }
    }
}
