//! 错误类型定义
//!
//! 提供块缓存操作中可恢复的错误类型。
//!
//! 容量耗尽、内部一致性错误属于致命错误，直接 panic，不经过这里。

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
    /// I/O 错误
    Io,
    /// 无效参数
    InvalidInput,
    /// 不存在
    NotFound,
    /// 已存在
    AlreadyExists,
    /// 空间不足
    NoSpace,
    /// 无效状态
    InvalidState,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 创建带原因的错误（简化版，原因只记录到日志）
    pub fn with_cause(kind: ErrorKind, message: &'static str, cause: impl fmt::Debug) -> Self {
        log::debug!("[BCACHE] {}: caused by {:?}", message, cause);
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

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_accessors() {
        let err = Error::new(ErrorKind::Io, "disk read failed");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.message(), "disk read failed");
    }

    #[test]
    fn test_error_display() {
        let err = Error::with_cause(ErrorKind::NoSpace, "log is full", 42);
        assert_eq!(err.to_string(), "NoSpace: log is full");
    }
}
