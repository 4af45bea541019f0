// 命令执行：打开通道 -> 读取结果 -> 关闭通道
use crate::config::ExecOptions;
use crate::ssh::reader::{read_result, PollWait};
use crate::ssh::result::CommandResult;
use crate::ssh::transport::{CommandChannel, TransportSession};
use crate::utils::error::Result;
use log::{debug, warn};
use std::ops::{Deref, DerefMut};

/// Closes the wrapped channel when dropped.
///
/// A failing close is logged and never replaces the outcome of the command.
pub struct ChannelGuard<'a, C: CommandChannel> {
    channel: C,
    command: &'a str,
}

impl<'a, C: CommandChannel> ChannelGuard<'a, C> {
    pub fn new(channel: C, command: &'a str) -> Self {
        Self { channel, command }
    }
}

impl<C: CommandChannel> Deref for ChannelGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.channel
    }
}

impl<C: CommandChannel> DerefMut for ChannelGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.channel
    }
}

impl<C: CommandChannel> Drop for ChannelGuard<'_, C> {
    fn drop(&mut self) {
        match self.channel.close() {
            Ok(()) => debug!("Channel for '{}' closed", self.command),
            Err(e) => warn!("Failed to close channel for '{}': {}", self.command, e),
        }
    }
}

pub fn execute_command<S, W>(
    session: &mut S,
    command: &str,
    options: &ExecOptions,
    waiter: &W,
) -> Result<CommandResult>
where
    S: TransportSession + ?Sized,
    W: PollWait + ?Sized,
{
    debug!("Opening exec channel for '{}'", command);
    let mut channel = ChannelGuard::new(session.open_channel(command)?, command);
    channel.connect()?;

    let result = read_result(&mut *channel, command, options, waiter)?;
    debug!("'{}' exited with status {}", command, result.exit_status());
    Ok(result)
}
