// SSH模块入口
pub mod client;
pub mod executor;
pub mod host_key;
pub mod reader;
pub mod result;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::SshClient;
pub use host_key::{AcceptAnyHostKey, HostKeyPolicy, KnownHostsFile};
pub use result::CommandResult;
pub use session::{connect_with_key, connect_with_password, RemoteShell, SshService};
pub use transport::{CommandChannel, Transport, TransportSession};
