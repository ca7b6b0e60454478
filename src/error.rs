use std::ffi::CStr;
use std::io;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum IfshError {
    #[error("interface {0} not found")]
    NotFound(String),

    /// 参数个数不对时输出的用法提示, 每行一条
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    Validation(String),

    #[error("{op}: {}", strerror(.source))]
    Kernel {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Busy(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("Privileged mode required")]
    Privilege,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error {0}")]
    Io(io::ErrorKind),

    #[error("JoinError: {0}")]
    JoinError(JoinError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IfshError {
    pub fn kernel(op: &'static str, source: io::Error) -> Self {
        IfshError::Kernel { op, source }
    }

    /// errno of a failed kernel request, if this is one
    pub fn errno(&self) -> Option<i32> {
        match self {
            IfshError::Kernel { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    pub fn usage(lines: &[&str]) -> Self {
        IfshError::Usage(lines.join("\n"))
    }
}

/// The kernel's own text for an error, without std's "(os error N)" suffix.
pub fn strerror(err: &io::Error) -> String {
    match err.raw_os_error() {
        Some(code) => unsafe {
            let msg = libc::strerror(code);
            if msg.is_null() {
                err.to_string()
            } else {
                CStr::from_ptr(msg).to_string_lossy().into_owned()
            }
        },
        None => err.to_string(),
    }
}

impl From<io::Error> for IfshError {
    fn from(err: io::Error) -> Self {
        IfshError::Io(err.kind())
    }
}

impl From<JoinError> for IfshError {
    fn from(err: JoinError) -> Self {
        IfshError::JoinError(err)
    }
}

impl From<serde_yaml::Error> for IfshError {
    fn from(err: serde_yaml::Error) -> Self {
        IfshError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IfshError>;
