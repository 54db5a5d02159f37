//! 块缓存常量定义

//=============================================================================
// 容量与分片
//=============================================================================

/// 默认缓冲区数量（缓存池容量）
pub const DEFAULT_POOL_CAPACITY: usize = 30;

/// 默认哈希桶数量
///
/// 取素数，使连续块号在桶之间分布均匀。
pub const DEFAULT_BUCKET_COUNT: usize = 13;

//=============================================================================
// 块大小
//=============================================================================

/// 默认块大小（字节）
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// 最大块大小（64 KiB）
pub const MAX_BLOCK_SIZE: usize = 65536;

//=============================================================================
// 时钟
//=============================================================================

/// 从未被释放过的缓冲区的时间戳
///
/// 时钟从 1 开始计数，因此未使用过的槽位总是比任何释放过的槽位更"旧"。
pub const NEVER_USED: u64 = 0;

/// 时钟初始值
pub const CLOCK_START: u64 = 1;
