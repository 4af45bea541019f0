// 传输层抽象：会话与执行通道
use crate::config::ConnectOptions;
use crate::utils::error::Result;
use std::io;

/// Opens authenticated sessions to remote hosts.
pub trait Transport: Send + Sync + 'static {
    type Session: TransportSession;

    fn connect(&self, options: &ConnectOptions) -> Result<Self::Session>;
}

/// One authenticated connection able to carry exec channels.
pub trait TransportSession: Send + 'static {
    type Channel: CommandChannel;

    /// Opens an exec channel for `command` without starting it.
    fn open_channel(&mut self, command: &str) -> Result<Self::Channel>;

    fn disconnect(&mut self) -> Result<()>;
}

/// A single-use stream running exactly one remote command.
pub trait CommandChannel {
    /// Sends the exec request.
    fn connect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Bytes that can be read right now without blocking.
    fn available(&mut self) -> io::Result<usize>;

    /// Reads buffered output. Returns 0 at end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Whether the remote side finished sending.
    fn is_closed(&mut self) -> bool;

    /// Only meaningful once [`is_closed`](Self::is_closed) returned true.
    fn exit_status(&mut self) -> io::Result<i32>;

    fn close(&mut self) -> io::Result<()>;
}
