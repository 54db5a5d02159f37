//! 错误类型定义
//!
//! 提供块缓存操作的错误类型。
//!
//! 可恢复的错误（缓存耗尽、设备 I/O 失败、非法配置）通过 [`Result`] 返回；
//! 调用方违反契约（例如对引用计数为 0 的缓冲区递减计数）属于程序 bug，直接 panic。

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
    /// 无效参数
    InvalidInput,
    /// 所有缓冲区都被引用，没有可驱逐的缓冲区
    Exhausted,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 创建缓存耗尽错误
    pub const fn exhausted() -> Self {
        Self::new(ErrorKind::Exhausted, "No evictable buffer: every slot is referenced")
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// 是否是缓存耗尽错误
    ///
    /// 调用方可以据此选择重试、退避或让上层请求失败。
    pub const fn is_exhausted(&self) -> bool {
        matches!(self.kind, ErrorKind::Exhausted)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_and_message() {
        let err = Error::new(ErrorKind::Io, "disk on fire");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.message(), "disk on fire");
        assert!(!err.is_exhausted());
    }

    #[test]
    fn test_exhausted() {
        let err = Error::exhausted();
        assert!(err.is_exhausted());
        assert_eq!(err.kind(), ErrorKind::Exhausted);
    }

    #[test]
    fn test_display() {
        let err = Error::new(ErrorKind::InvalidInput, "bad config");
        assert_eq!(format!("{}", err), "InvalidInput: bad config");
    }
}
