//! 缓冲区槽位结构
//!
//! 每个槽位分成两部分，分别由不同的锁保护：
//!
//! - [`BufferMeta`]：块身份、引用计数、时间戳、哈希桶链接。由一把短持有的
//!   元数据锁保护，只用于指针和计数器的修改。
//! - [`BufferContent`]：块数据和状态标志，由缓冲区的独占锁保护，
//!   持有期间可能跨越设备 I/O。

use crate::consts::NEVER_USED;
use crate::types::{BlockKey, BucketId, SlotIndex, Timestamp};
use bitflags::bitflags;
use parking_lot::Mutex;

bitflags! {
    /// 缓冲区状态标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferFlags: u8 {
        /// 数据已从设备读入（有效）
        const VALID = 0x01;
        /// 数据已被持有者修改，尚未写回
        const DIRTY = 0x02;
    }
}

/// 槽位元数据
///
/// `prev`/`next` 是所在哈希桶链表中的相邻槽位索引，替代侵入式指针。
/// 链接字段归保护该桶的锁所有；`ref_count` 从 0 变为非 0 只可能发生在
/// 持有所在桶锁（或全局驱逐锁）时。
#[derive(Debug, Clone)]
pub(crate) struct BufferMeta {
    /// 当前块身份，首次分配前为 None
    pub key: Option<BlockKey>,
    /// 引用计数，> 0 时不可驱逐
    pub ref_count: u32,
    /// 引用计数最后一次降为 0 时的时钟值
    pub last_used: Timestamp,
    /// 所在哈希桶，首次分配前为 None
    pub bucket: Option<BucketId>,
    /// 链表前驱
    pub prev: Option<SlotIndex>,
    /// 链表后继
    pub next: Option<SlotIndex>,
}

impl BufferMeta {
    pub fn new() -> Self {
        Self {
            key: None,
            ref_count: 0,
            last_used: NEVER_USED,
            bucket: None,
            prev: None,
            next: None,
        }
    }

    /// 是否持有指定身份
    #[inline]
    pub fn holds(&self, key: &BlockKey) -> bool {
        self.key.as_ref() == Some(key)
    }

    /// 增加引用计数
    pub fn get(&mut self) {
        assert!(self.ref_count < u32::MAX, "bcache: ref_count overflow");
        self.ref_count += 1;
    }

    /// 减少引用计数
    ///
    /// 返回减少后引用计数是否降为 0。对未被引用的缓冲区调用是调用方 bug。
    pub fn put(&mut self) -> bool {
        assert!(self.ref_count > 0, "bcache: release of unreferenced buffer");
        self.ref_count -= 1;
        self.ref_count == 0
    }

    /// 检查是否正在被引用
    #[inline]
    pub fn is_referenced(&self) -> bool {
        self.ref_count > 0
    }
}

/// 缓冲区内容
///
/// 只有缓冲区独占锁的持有者可以读写。
pub(crate) struct BufferContent {
    /// 块数据
    pub data: Box<[u8]>,
    /// 状态标志
    pub flags: BufferFlags,
}

impl BufferContent {
    pub fn new(block_size: usize) -> Self {
        Self {
            data: vec![0u8; block_size].into_boxed_slice(),
            flags: BufferFlags::empty(),
        }
    }

    /// 标记数据有效
    pub fn mark_valid(&mut self) {
        self.flags.insert(BufferFlags::VALID);
    }

    /// 检查数据是否有效
    pub fn is_valid(&self) -> bool {
        self.flags.contains(BufferFlags::VALID)
    }

    /// 标记为脏（已修改）
    pub fn mark_dirty(&mut self) {
        self.flags.insert(BufferFlags::DIRTY);
    }

    /// 标记为干净（已写入设备）
    pub fn mark_clean(&mut self) {
        self.flags.remove(BufferFlags::DIRTY);
    }

    /// 检查是否是脏块
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(BufferFlags::DIRTY)
    }

    /// 身份被重新分配时清空全部状态，数据本身不必清零
    pub fn reset(&mut self) {
        self.flags = BufferFlags::empty();
    }
}

/// 缓冲池中的一个槽位
///
/// 槽位在缓存初始化时一次性分配，之后只会被重新分配身份，不会销毁。
pub(crate) struct Buffer {
    /// 元数据锁（短持有）
    pub meta: Mutex<BufferMeta>,
    /// 独占锁（可能跨越设备 I/O，竞争时挂起等待）
    pub content: Mutex<BufferContent>,
}

impl Buffer {
    pub fn new(block_size: usize) -> Self {
        Self {
            meta: Mutex::new(BufferMeta::new()),
            content: Mutex::new(BufferContent::new(block_size)),
        }
    }
}

impl core::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let meta = self.meta.lock();
        f.debug_struct("Buffer")
            .field("key", &meta.key)
            .field("ref_count", &meta.ref_count)
            .field("last_used", &meta.last_used)
            .field("bucket", &meta.bucket)
            .field("locked", &self.content.is_locked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_creation() {
        let buf = Buffer::new(4096);
        let meta = buf.meta.lock();
        assert_eq!(meta.key, None);
        assert_eq!(meta.bucket, None);
        assert_eq!(meta.ref_count, 0);
        assert_eq!(meta.last_used, NEVER_USED);
        assert!(!meta.is_referenced());

        let content = buf.content.lock();
        assert_eq!(content.data.len(), 4096);
        assert_eq!(content.flags, BufferFlags::empty());
    }

    #[test]
    fn test_reference_counting() {
        let mut meta = BufferMeta::new();

        meta.get();
        assert_eq!(meta.ref_count, 1);
        assert!(meta.is_referenced());

        meta.get();
        assert_eq!(meta.ref_count, 2);

        assert!(!meta.put());
        assert_eq!(meta.ref_count, 1);

        assert!(meta.put());
        assert!(!meta.is_referenced());
    }

    #[test]
    #[should_panic(expected = "release of unreferenced buffer")]
    fn test_put_underflow_panics() {
        let mut meta = BufferMeta::new();
        meta.put();
    }

    #[test]
    fn test_holds() {
        let mut meta = BufferMeta::new();
        let key = BlockKey::new(1, 7);
        assert!(!meta.holds(&key));
        meta.key = Some(key);
        assert!(meta.holds(&key));
        assert!(!meta.holds(&BlockKey::new(2, 7)));
    }

    #[test]
    fn test_flags() {
        let mut content = BufferContent::new(64);

        assert!(!content.is_valid());
        assert!(!content.is_dirty());

        content.mark_valid();
        content.mark_dirty();
        assert!(content.is_valid());
        assert!(content.is_dirty());
        assert!(content.flags.contains(BufferFlags::VALID | BufferFlags::DIRTY));

        content.mark_clean();
        assert!(content.is_valid());
        assert!(!content.is_dirty());

        content.mark_dirty();
        content.reset();
        assert_eq!(content.flags, BufferFlags::empty());
    }
}
