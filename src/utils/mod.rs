// 工具模块入口
pub mod error;

pub use error::{ErrorKind, Result, SshError};
