// 结果读取：排空通道输出后才获取退出码
use crate::config::ExecOptions;
use crate::ssh::result::CommandResult;
use crate::ssh::transport::CommandChannel;
use crate::utils::error::{Result, SshError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::trace;
use std::io;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// Blocks the reading thread between two polls.
pub trait PollWait {
    fn wait(&self, interval: Duration) -> std::result::Result<(), Interrupted>;

    /// Non-blocking check, made while output is still streaming in.
    fn is_interrupted(&self) -> bool;
}

/// Sleeps on a channel so the wait can be cut short by [`InterruptHandle::fire`].
#[derive(Debug, Clone)]
pub struct InterruptSignal {
    receiver: Receiver<()>,
}

#[derive(Debug)]
pub struct InterruptHandle {
    sender: Sender<()>,
}

impl InterruptHandle {
    /// Wakes every waiter of the paired signal with [`Interrupted`].
    pub fn fire(self) {
        // 发送端析构后所有接收端立即返回 Disconnected
        drop(self.sender);
    }
}

pub fn interrupt_pair() -> (InterruptHandle, InterruptSignal) {
    let (sender, receiver) = bounded(0);
    (InterruptHandle { sender }, InterruptSignal { receiver })
}

impl PollWait for InterruptSignal {
    fn wait(&self, interval: Duration) -> std::result::Result<(), Interrupted> {
        match self.receiver.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Err(Interrupted),
        }
    }

    fn is_interrupted(&self) -> bool {
        !matches!(self.receiver.try_recv(), Err(TryRecvError::Empty))
    }
}

enum ReadState {
    Draining,
    Done(i32),
}

struct ReadContext<'a, W: ?Sized> {
    command: &'a str,
    options: &'a ExecOptions,
    waiter: &'a W,
    started: Instant,
}

impl<W: PollWait + ?Sized> ReadContext<'_, W> {
    fn read_error(&self, source: io::Error) -> SshError {
        SshError::Read {
            command: self.command.to_string(),
            source,
        }
    }

    fn interrupted(&self) -> SshError {
        SshError::Interrupted {
            command: self.command.to_string(),
        }
    }

    /// Fails once the command ran past `exec_timeout` or the session is being closed.
    fn checkpoint(&self) -> Result<()> {
        if self.waiter.is_interrupted() {
            return Err(self.interrupted());
        }
        self.remaining().map(|_| ())
    }

    /// Time left before `exec_timeout`; `None` when unbounded.
    fn remaining(&self) -> Result<Option<Duration>> {
        let Some(timeout) = self.options.exec_timeout else {
            return Ok(None);
        };

        let elapsed = self.started.elapsed();
        if elapsed >= timeout {
            return Err(SshError::ExecutionTimeout {
                command: self.command.to_string(),
                timeout,
            });
        }
        Ok(Some(timeout - elapsed))
    }

    fn pause(&self) -> Result<()> {
        let interval = match self.remaining()? {
            Some(left) => self.options.poll_interval.min(left),
            None => self.options.poll_interval,
        };
        trace!("'{}': no output yet, waiting {:?}", self.command, interval);
        self.waiter.wait(interval).map_err(|Interrupted| self.interrupted())
    }

    fn drain<C>(&self, channel: &mut C, chunk: &mut [u8], output: &mut Vec<u8>) -> Result<()>
    where
        C: CommandChannel + ?Sized,
    {
        while channel.available().map_err(|e| self.read_error(e))? > 0 {
            let read = channel.read(chunk).map_err(|e| self.read_error(e))?;
            if read == 0 {
                break;
            }
            output.extend_from_slice(&chunk[..read]);
            // 持续输出的命令同样受超时和中断约束
            self.checkpoint()?;
        }
        Ok(())
    }
}

/// Reads everything `channel` produces and returns it with the exit status.
///
/// `command` is only used to label errors and the returned result.
pub fn read_result<C, W>(
    channel: &mut C,
    command: &str,
    options: &ExecOptions,
    waiter: &W,
) -> Result<CommandResult>
where
    C: CommandChannel + ?Sized,
    W: PollWait + ?Sized,
{
    if !channel.is_connected() {
        return Err(SshError::execution(command, "The channel is not connected"));
    }

    let context = ReadContext {
        command,
        options,
        waiter,
        started: Instant::now(),
    };
    let mut output = Vec::new();
    let mut chunk = vec![0u8; options.chunk_size.max(1)];
    let mut state = ReadState::Draining;

    let exit_status = loop {
        state = match state {
            ReadState::Done(status) => break status,
            ReadState::Draining => {
                context.drain(channel, &mut chunk, &mut output)?;

                if channel.is_closed() {
                    if channel.available().map_err(|e| context.read_error(e))? > 0 {
                        // 已关闭但缓冲区仍有数据，继续读取
                        ReadState::Draining
                    } else {
                        ReadState::Done(channel.exit_status().map_err(|e| context.read_error(e))?)
                    }
                } else {
                    context.pause()?;
                    ReadState::Draining
                }
            }
        };
    };

    Ok(CommandResult::from_output(command, &output, exit_status))
}
