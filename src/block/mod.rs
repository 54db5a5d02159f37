//! 存储传输层
//!
//! 缓存只负责块的身份、缓存和驱逐，真正的读写通过 [`BlockDevice`] 同步完成。
//! [`MemDevice`] 是内存实现，用于测试或没有真实磁盘的宿主环境。

mod device;
mod mem;

pub use device::BlockDevice;
pub use mem::MemDevice;
