//! bcache: 多线程共享的定长块缓存
//!
//! 这是一个纯 Rust 实现的块缓存库，旨在提供：
//! - **零 unsafe 代码**
//! - **有界容量** + 基于最近使用时间的驱逐
//! - **分桶查找**：命中路径只持有一把桶锁
//! - **每块一份拷贝**：同一个 `(设备号, 块号)` 在缓存中至多一份
//!
//! # 示例
//!
//! ```rust,ignore
//! use bcache::{BlockDevice, BufferCache, CacheConfig, Result};
//!
//! // 实现 BlockDevice trait
//! struct MyDisk {
//!     // ...
//! }
//!
//! impl BlockDevice for MyDisk {
//!     // 实现 read_block / write_block
//!     // ...
//! }
//!
//! fn main() -> Result<()> {
//!     let cache = BufferCache::new(MyDisk::new(), CacheConfig::default())?;
//!
//!     // 读取块
//!     let buf = cache.read(1, 0)?;
//!     println!("first byte: {:02x}", buf.data()[0]);
//!
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`block`] - 存储传输层接口
//! - [`consts`] - 常量定义
//! - [`types`] - 块身份与索引类型
//! - [`cache`] - 块缓存

#![deny(unsafe_code)]
#![warn(missing_docs)]

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 存储传输层
pub mod block;

/// 常量定义
pub mod consts;

/// 基础类型
pub mod types;

/// 块缓存
pub mod cache;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 块设备
pub use block::{BlockDevice, MemDevice};

// 类型
pub use types::{BlockKey, BlockNo, BucketId, DeviceId, SlotIndex, Timestamp};

// Cache
pub use cache::{
    BufferCache, BufferFlags, BufferHandle, CacheConfig, CacheStats, PinnedBuffer, RecencyClock,
    Ticker,
};

// 常量
pub use consts::{DEFAULT_BLOCK_SIZE, DEFAULT_BUCKET_COUNT, DEFAULT_POOL_CAPACITY};
