//! 错误类型定义
//!
//! 提供块缓存操作的错误类型。
//!
//! 致命错误（缓冲区耗尽、调用方违反持锁约定、内部簿记损坏）以 `Err` 返回，
//! 由调用方的顶层处理器决定是否停机；库本身从不终止进程。

use core::fmt;

/// 块缓存操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 设备 I/O 错误
    Io,
    /// 所有缓冲槽都在使用中
    NoBuffers,
    /// 调用方未持有缓冲槽的独占锁
    NotHolder,
    /// 无效参数
    InvalidInput,
    /// 无效状态
    InvalidState,
}

impl ErrorKind {
    /// 是否属于不可恢复的错误
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::NoBuffers | ErrorKind::NotHolder | ErrorKind::InvalidState
        )
    }
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// 是否为致命错误
    ///
    /// 致命错误不应重试：缓冲池耗尽说明调用方泄漏了引用或池太小，
    /// 持锁约定被违反则是编程错误。
    pub const fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
