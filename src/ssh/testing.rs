// 测试用的脚本化传输层，不访问网络
use crate::config::ConnectOptions;
use crate::ssh::transport::{CommandChannel, Transport, TransportSession};
use crate::ssh::reader::{Interrupted, PollWait};
use crate::utils::error::{Result, SshError};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Event {
    Data(Vec<u8>),
    Idle,
    /// Remote close. `late` shows up in the buffer only after the close was observed.
    Close { status: i32, late: Vec<u8> },
    Fail,
    /// Output that never stops and never closes, like `yes`.
    Stream,
}

#[derive(Debug, Default)]
pub struct CountingWait {
    waits: AtomicUsize,
}

impl CountingWait {
    pub fn count(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }
}

impl PollWait for CountingWait {
    fn wait(&self, _interval: Duration) -> std::result::Result<(), Interrupted> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_interrupted(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
pub struct Recorded {
    pub opened: Vec<String>,
    pub active: usize,
    pub max_active: usize,
    pub closed: usize,
    pub disconnects: usize,
    pub connects: Vec<ConnectOptions>,
}

#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Recorded>>);

impl Recorder {
    pub fn with<R>(&self, f: impl FnOnce(&mut Recorded) -> R) -> R {
        let mut state = self.0.lock().unwrap();
        f(&mut state)
    }
}

pub struct ScriptedChannel {
    events: VecDeque<Event>,
    buffer: VecDeque<u8>,
    late: Vec<u8>,
    connected: bool,
    closed: bool,
    failing: bool,
    streaming: bool,
    reads: usize,
    status: i32,
    recorder: Option<Recorder>,
    fail_close: bool,
}

impl ScriptedChannel {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: events.into(),
            buffer: VecDeque::new(),
            late: Vec::new(),
            connected: false,
            closed: false,
            failing: false,
            streaming: false,
            reads: 0,
            status: -1,
            recorder: None,
            fail_close: false,
        }
    }

    pub fn connected(events: Vec<Event>) -> Self {
        let mut channel = Self::new(events);
        channel.connected = true;
        channel
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    fn advance(&mut self) {
        match self.events.pop_front() {
            Some(Event::Data(bytes)) => self.buffer.extend(bytes),
            Some(Event::Close { status, late }) => {
                self.closed = true;
                self.status = status;
                self.late = late;
            }
            Some(Event::Fail) => self.failing = true,
            Some(Event::Stream) => self.streaming = true,
            // 脚本结束后视为命令仍在运行
            Some(Event::Idle) | None => {}
        }
    }
}

impl CommandChannel for ScriptedChannel {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn available(&mut self) -> io::Result<usize> {
        if self.streaming {
            return Ok(1);
        }
        if self.buffer.is_empty() && !self.closed {
            self.advance();
        }
        if self.failing {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "scripted failure"));
        }
        Ok(self.buffer.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        if self.streaming {
            buf[0] = b'y';
            return Ok(1);
        }
        let n = buf.len().min(self.buffer.len());
        for (slot, byte) in buf.iter_mut().zip(self.buffer.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn is_closed(&mut self) -> bool {
        if self.closed && !self.late.is_empty() {
            self.buffer.extend(std::mem::take(&mut self.late));
        }
        self.closed
    }

    fn exit_status(&mut self) -> io::Result<i32> {
        Ok(self.status)
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(recorder) = &self.recorder {
            recorder.with(|state| {
                state.active -= 1;
                state.closed += 1;
            });
        }
        if self.fail_close {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "close failed"));
        }
        Ok(())
    }
}

/// Output script for a command: `echo X` prints X, `exit N` exits with N,
/// `fail` breaks the stream, `hang` never finishes, `yes` prints forever.
pub fn default_script(command: &str) -> Vec<Event> {
    if let Some(text) = command.strip_prefix("echo ") {
        vec![
            Event::Data(format!("{text}\n").into_bytes()),
            Event::Close { status: 0, late: Vec::new() },
        ]
    } else if let Some(code) = command.strip_prefix("exit ") {
        vec![Event::Close { status: code.parse().unwrap_or(255), late: Vec::new() }]
    } else if command == "fail" {
        vec![Event::Idle, Event::Fail]
    } else if command == "hang" {
        Vec::new()
    } else if command == "yes" {
        vec![Event::Stream]
    } else {
        vec![Event::Close { status: 127, late: Vec::new() }]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Succeed,
    Timeout,
    RejectAuth,
}

pub struct ScriptedTransport {
    pub recorder: Recorder,
    pub behavior: ConnectBehavior,
    pub fail_close: bool,
    pub connect_delay: Duration,
}

impl ScriptedTransport {
    pub fn new(behavior: ConnectBehavior) -> Self {
        Self {
            recorder: Recorder::default(),
            behavior,
            fail_close: false,
            connect_delay: Duration::ZERO,
        }
    }
}

impl Transport for ScriptedTransport {
    type Session = ScriptedSession;

    fn connect(&self, options: &ConnectOptions) -> Result<ScriptedSession> {
        std::thread::sleep(self.connect_delay);
        self.recorder.with(|state| state.connects.push(options.clone()));
        match self.behavior {
            ConnectBehavior::Succeed => Ok(ScriptedSession {
                recorder: self.recorder.clone(),
                fail_close: self.fail_close,
            }),
            ConnectBehavior::Timeout => Err(SshError::ConnectTimeout {
                host: options.host.clone(),
                port: options.port,
                timeout: options.timeout,
            }),
            ConnectBehavior::RejectAuth => Err(SshError::AuthenticationFailed {
                username: options.username.clone(),
            }),
        }
    }
}

pub struct ScriptedSession {
    recorder: Recorder,
    fail_close: bool,
}

impl TransportSession for ScriptedSession {
    type Channel = ScriptedChannel;

    fn open_channel(&mut self, command: &str) -> Result<ScriptedChannel> {
        self.recorder.with(|state| {
            state.opened.push(command.to_string());
            state.active += 1;
            state.max_active = state.max_active.max(state.active);
        });
        let mut channel = ScriptedChannel::new(default_script(command));
        channel.recorder = Some(self.recorder.clone());
        channel.fail_close = self.fail_close;
        Ok(channel)
    }

    fn disconnect(&mut self) -> Result<()> {
        self.recorder.with(|state| state.disconnects += 1);
        Ok(())
    }
}
