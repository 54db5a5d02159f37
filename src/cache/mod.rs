//! 块缓存模块
//!
//! 这个模块提供固定容量、多线程共享的块缓存：给调用方提供块内容的互斥访问，
//! 保证每个 `(设备号, 块号)` 最多只有一份缓存拷贝，用哈希分桶把查找分散到
//! 互不干扰的桶锁上，同时仍然基于整个缓冲池做 LRU 驱逐决策。
//!
//! # 主要组件
//!
//! - [`BufferCache`] - 块缓存管理器：缓冲池、哈希索引、全局驱逐锁
//! - [`BufferHandle`] - 持有独占锁的缓冲区句柄（RAII）
//! - [`PinnedBuffer`] - 钉住凭证，只占引用计数、不持有独占锁
//! - [`BufferFlags`] - 缓冲区状态标志
//! - [`RecencyClock`] / [`Ticker`] - 最近使用时钟及其定时推进器
//! - [`CacheConfig`] - 容量、分桶数、块大小
//! - [`CacheStats`] - 缓存统计信息
//!
//! # 设计原理
//!
//! | 组件         | 实现                                                    |
//! |--------------|---------------------------------------------------------|
//! | 缓冲池       | `Box<[Buffer]>`，初始化时一次性分配                      |
//! | 哈希索引     | `Box<[Bucket]>`，每桶一把锁 + 下标链接的双向链表          |
//! | 驱逐协调     | `Mutex<()>`，串行化未命中路径                            |
//! | 缓冲区独占锁 | `parking_lot::Mutex<BufferContent>`，竞争时挂起而不是自旋 |
//! | 链表指针     | `prev`/`next: Option<SlotIndex>`，不使用裸指针           |
//!
//! 1. **无全局单例**：[`BufferCache`] 是普通的值，构造一次后以引用传递
//! 2. **无 unsafe**：链表链接是数组下标，别名和悬垂问题不存在
//! 3. **类型化错误**：缓冲池耗尽是可恢复的 [`ErrorKind::Exhausted`](crate::ErrorKind::Exhausted)，
//!    调用方违反契约（对未被引用的槽位递减计数等）直接 panic
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use bcache::{BufferCache, CacheConfig, MemDevice};
//!
//! let cache = BufferCache::new(MemDevice::new(1024), CacheConfig::default())?;
//!
//! // 读取块：命中时不访问设备
//! let mut buf = cache.read(1, 100)?;
//! buf.data_mut()[0] = 42;
//!
//! // 写穿
//! buf.flush()?;
//!
//! // 跨越多次获取/释放保持驻留（例如日志层）
//! let pinned = buf.pin();
//! cache.release(buf);
//! // ...
//! cache.unpin(pinned);
//!
//! // 查看统计信息
//! let stats = cache.stats();
//! println!("hits={} misses={} evictions={}", stats.hits, stats.misses, stats.evictions);
//! ```

mod block_cache;
mod bucket;
mod buffer;
mod clock;
mod config;
mod handle;

pub use block_cache::{BufferCache, CacheStats};
pub use buffer::BufferFlags;
pub use clock::{RecencyClock, Ticker};
pub use config::CacheConfig;
pub use handle::{BufferHandle, PinnedBuffer};
