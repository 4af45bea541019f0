// 命令执行结果
use serde::Serialize;
use std::fmt;

/// Output and exit status of one remote command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    command: String,
    response: String,
    exit_status: i32,
}

impl CommandResult {
    pub fn new(command: impl Into<String>, response: impl Into<String>, exit_status: i32) -> Self {
        Self {
            command: command.into(),
            response: response.into(),
            exit_status,
        }
    }

    /// Builds a result from the raw bytes read off the channel.
    pub fn from_output(command: impl Into<String>, output: &[u8], exit_status: i32) -> Self {
        Self::new(command, String::from_utf8_lossy(output), exit_status)
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn exit_status(&self) -> i32 {
        self.exit_status
    }

    pub fn is_success(&self) -> bool {
        self.exit_status == 0
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Result [command={}, response={}, exitStatus={}]",
            self.command, self.response, self.exit_status
        )
    }
}
