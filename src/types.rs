//! 块缓存基础类型
//!
//! 块身份 `(设备号, 块号)` 以及缓存内部使用的索引类型。

use core::fmt;

/// 设备号
pub type DeviceId = u32;

/// 块号
pub type BlockNo = u64;

/// 缓冲池槽位索引
pub type SlotIndex = usize;

/// 哈希桶索引
pub type BucketId = usize;

/// 最近使用时间戳（[`RecencyClock`](crate::cache::RecencyClock) 的读数）
pub type Timestamp = u64;

/// 块身份
///
/// 缓存保证同一个 `BlockKey` 在池中最多只有一份拷贝。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey {
    /// 设备号
    pub device: DeviceId,
    /// 块号
    pub block: BlockNo,
}

impl BlockKey {
    /// 创建块身份
    pub const fn new(device: DeviceId, block: BlockNo) -> Self {
        Self { device, block }
    }

    /// 计算所属哈希桶
    ///
    /// 只用块号参与散列，设备号不影响分桶。
    #[inline]
    pub fn bucket(&self, bucket_count: usize) -> BucketId {
        (self.block % bucket_count as u64) as BucketId
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#x}", self.device, self.block)
    }
}
