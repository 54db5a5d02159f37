//! 缓冲区句柄 - RAII 风格的块访问
//!
//! 句柄持有缓冲区的独占锁和一个引用计数：
//! - 持有期间其他调用方无法读写同一个块，该块也不会被驱逐
//! - 只有持有句柄才能读写数据、写回设备
//! - 丢弃或调用 [`BufferHandle::release`] 时放开独占锁并递减引用计数
//!
//! 句柄被消费后无法再访问缓冲区，重复释放在类型层面就不可能发生。
//!
//! [`PinnedBuffer`] 是钉住凭证：只占一个引用计数、不持有独占锁，
//! 用于让缓冲区跨越多次获取/释放保持驻留。

use super::block_cache::BufferCache;
use super::buffer::BufferContent;
use crate::block::BlockDevice;
use crate::error::Result;
use crate::types::{BlockKey, BlockNo, DeviceId, SlotIndex};
use parking_lot::MutexGuard;

/// 缓冲区句柄
///
/// # 示例
///
/// ```rust,ignore
/// // 读取块
/// let buf = cache.read(1, 0)?;
/// buf.with_data(|data| {
///     println!("First byte: {:02x}", data[0]);
/// });
///
/// // 修改并写回
/// let mut buf = cache.read(1, 1)?;
/// buf.with_data_mut(|data| {
///     data[0] = 0x42;
/// });
/// buf.flush()?;
/// // buf 超出作用域时自动释放
/// ```
pub struct BufferHandle<'a, D: BlockDevice> {
    /// 所属缓存
    cache: &'a BufferCache<D>,
    /// 槽位下标
    slot: SlotIndex,
    /// 块身份
    key: BlockKey,
    /// 独占锁（释放时取出）
    guard: Option<MutexGuard<'a, BufferContent>>,
}

impl<'a, D: BlockDevice> BufferHandle<'a, D> {
    /// 包装已增加引用计数并锁定的槽位
    pub(super) fn new(
        cache: &'a BufferCache<D>,
        slot: SlotIndex,
        key: BlockKey,
        guard: MutexGuard<'a, BufferContent>,
    ) -> Self {
        Self {
            cache,
            slot,
            key,
            guard: Some(guard),
        }
    }

    fn content(&self) -> &BufferContent {
        match &self.guard {
            Some(guard) => &**guard,
            None => unreachable!("bcache: buffer used after release"),
        }
    }

    pub(super) fn content_mut(&mut self) -> &mut BufferContent {
        match &mut self.guard {
            Some(guard) => &mut **guard,
            None => unreachable!("bcache: buffer used after release"),
        }
    }

    /// 是否属于指定缓存
    pub(super) fn belongs_to(&self, cache: &BufferCache<D>) -> bool {
        core::ptr::eq(self.cache, cache)
    }

    /// 槽位下标
    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    /// 块身份
    pub fn key(&self) -> BlockKey {
        self.key
    }

    /// 设备号
    pub fn device_id(&self) -> DeviceId {
        self.key.device
    }

    /// 块号
    pub fn block_no(&self) -> BlockNo {
        self.key.block
    }

    /// 数据是否有效（已从设备读入）
    pub fn is_valid(&self) -> bool {
        self.content().is_valid()
    }

    /// 是否有未写回的修改
    pub fn is_dirty(&self) -> bool {
        self.content().is_dirty()
    }

    /// 块数据（只读）
    pub fn data(&self) -> &[u8] {
        &self.content().data
    }

    /// 块数据（可写），自动标记为脏
    pub fn data_mut(&mut self) -> &mut [u8] {
        let content = self.content_mut();
        content.mark_dirty();
        &mut content.data
    }

    /// 通过闭包访问块数据
    pub fn with_data<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        f(self.data())
    }

    /// 通过闭包修改块数据，自动标记为脏
    pub fn with_data_mut<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        f(self.data_mut())
    }

    /// 同步写回设备，见 [`BufferCache::flush`]
    pub fn flush(&mut self) -> Result<()> {
        let cache = self.cache;
        cache.flush(self)
    }

    /// 钉住缓冲区，见 [`BufferCache::pin`]
    pub fn pin(&self) -> PinnedBuffer<'a, D> {
        self.cache.pin(self)
    }

    /// 手动释放（消费 self）
    ///
    /// 通常不需要手动调用，Drop trait 会自动处理。
    pub fn release(self) {
        drop(self);
    }
}

/// 实现 Drop trait，自动释放缓冲区
impl<'a, D: BlockDevice> Drop for BufferHandle<'a, D> {
    fn drop(&mut self) {
        // 先放开独占锁再递减引用计数
        if let Some(guard) = self.guard.take() {
            drop(guard);
            self.cache.put_slot(self.slot, self.key);
        }
    }
}

/// 钉住凭证
///
/// 持有一个引用计数，使缓冲区不可驱逐，但不持有独占锁。
/// 调用 [`unpin`](Self::unpin) 或丢弃凭证时取消钉住；凭证不可复制，
/// 多余的 unpin 在类型层面就不可能发生。
#[must_use = "dropping a PinnedBuffer unpins the buffer immediately"]
pub struct PinnedBuffer<'a, D: BlockDevice> {
    cache: &'a BufferCache<D>,
    slot: SlotIndex,
    key: BlockKey,
}

impl<'a, D: BlockDevice> PinnedBuffer<'a, D> {
    pub(super) fn new(cache: &'a BufferCache<D>, slot: SlotIndex, key: BlockKey) -> Self {
        Self { cache, slot, key }
    }

    pub(super) fn belongs_to(&self, cache: &BufferCache<D>) -> bool {
        core::ptr::eq(self.cache, cache)
    }

    /// 槽位下标
    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    /// 块身份
    pub fn key(&self) -> BlockKey {
        self.key
    }

    /// 取消钉住（消费 self）
    pub fn unpin(self) {
        drop(self);
    }
}

impl<'a, D: BlockDevice> Drop for PinnedBuffer<'a, D> {
    fn drop(&mut self) {
        log::trace!("[BCACHE] unpin {} slot={}", self.key, self.slot);
        self.cache.put_slot(self.slot, self.key);
    }
}

impl<'a, D: BlockDevice> core::fmt::Debug for PinnedBuffer<'a, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PinnedBuffer")
            .field("slot", &self.slot)
            .field("key", &self.key)
            .finish()
    }
}

impl<'a, D: BlockDevice> core::fmt::Debug for BufferHandle<'a, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufferHandle")
            .field("slot", &self.slot)
            .field("key", &self.key)
            .field("flags", &self.content().flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::block::MemDevice;
    use crate::cache::{BufferCache, CacheConfig};

    fn cache() -> BufferCache<MemDevice> {
        let config = CacheConfig::default()
            .with_pool_capacity(4)
            .with_bucket_count(2)
            .with_block_size(128);
        BufferCache::new(MemDevice::new(128), config).unwrap()
    }

    #[test]
    fn test_handle_identity() {
        let cache = cache();
        let buf = cache.acquire(2, 0x99).unwrap();
        assert_eq!(buf.device_id(), 2);
        assert_eq!(buf.block_no(), 0x99);
        assert_eq!(buf.key().block, 0x99);
        assert_eq!(buf.data().len(), 128);
    }

    #[test]
    fn test_with_data() {
        let cache = cache();
        cache.device().preload(1, 0, &[7, 8, 9]);

        let buf = cache.read(1, 0).unwrap();
        let sum: u32 = buf.with_data(|data| data[..3].iter().map(|&b| b as u32).sum());
        assert_eq!(sum, 24);
        assert!(!buf.is_dirty());
    }

    #[test]
    fn test_with_data_mut_marks_dirty() {
        let cache = cache();
        {
            let mut buf = cache.read(1, 1).unwrap();
            buf.with_data_mut(|data| {
                data[0] = 0x42;
                data[1] = 0x43;
            });
            assert!(buf.is_dirty());
            buf.flush().unwrap();
            assert!(!buf.is_dirty());
        } // 自动释放

        // 修改仍在缓存中
        let buf = cache.read(1, 1).unwrap();
        assert_eq!(&buf.data()[..2], &[0x42, 0x43]);
        assert_eq!(cache.device().reads(), 1);
        assert_eq!(cache.device().writes(), 1);
    }

    #[test]
    fn test_explicit_release_and_drop() {
        let cache = cache();

        let buf = cache.acquire(1, 5).unwrap();
        buf.release();

        {
            let _buf = cache.acquire(1, 5).unwrap();
            // _buf 在这里自动 drop
        }

        // 可以再次获取，且是同一个槽位
        let buf = cache.acquire(1, 5).unwrap();
        assert_eq!(buf.slot(), 0);
        assert_eq!(cache.stats().hits, 2);
    }

    #[test]
    fn test_pin_through_handle() {
        let cache = cache();

        let buf = cache.read(1, 3).unwrap();
        let pinned = buf.pin();
        buf.release();
        assert_eq!(pinned.key().block, 3);

        // 钉住的块跨越释放仍保持驻留
        let buf = cache.read(1, 3).unwrap();
        assert_eq!(buf.slot(), pinned.slot());
        drop(buf);
        pinned.unpin();
        assert!(cache.is_cached(1, 3));
        assert_eq!(cache.device().reads(), 1);
    }

    #[test]
    fn test_unpin_while_another_holder_has_the_buffer() {
        let cache = cache();

        let buf = cache.read(1, 4).unwrap();
        let pinned = buf.pin();
        drop(buf);

        // 持有独占锁的是另一个句柄，取消钉住只动引用计数，不会阻塞
        let mut holder = cache.read(1, 4).unwrap();
        std::thread::scope(|s| {
            s.spawn(move || pinned.unpin()).join().unwrap();
        });
        holder.data_mut()[0] = 1;
        assert!(holder.is_dirty());
        drop(holder);

        // 没有剩余引用，块可以被回收
        for block in 10..14 {
            drop(cache.acquire(1, block).unwrap());
        }
        assert!(!cache.is_cached(1, 4));
    }

    #[test]
    fn test_dropping_pin_unpins() {
        let cache = cache();
        {
            let buf = cache.acquire(1, 6).unwrap();
            let _pinned = buf.pin();
        }
        for block in 20..24 {
            drop(cache.acquire(1, block).unwrap());
        }
        assert!(!cache.is_cached(1, 6));
    }

    #[test]
    fn test_debug_format() {
        let cache = cache();
        let buf = cache.acquire(1, 2).unwrap();
        let s = format!("{:?}", buf);
        assert!(s.contains("BufferHandle"));
        assert!(s.contains("slot: 0"));
    }
}
