//! 块缓存实现
//!
//! # 锁的层次
//!
//! ```text
//! evict_lock（全局，只有未命中路径获取）
//!     └── 桶锁（每个哈希桶一把）
//!             └── 缓冲区独占锁（BufferContent，可能跨越设备 I/O）
//!
//! 槽位元数据锁：叶子锁，只在修改计数器/链接时短暂持有
//! ```
//!
//! - 命中路径只获取目标桶锁，不同桶上的查找互不干扰。
//! - 同时持有多把桶锁只发生在已持有全局锁时，全局锁把这种情况串行化，
//!   因此不会形成环路。
//! - 任何线程持有或等待缓冲区独占锁时，该缓冲区的 `ref_count >= 1`；
//!   释放时先放开独占锁再递减计数。所以驱逐路径看到 `ref_count == 0`
//!   时，独占锁一定空闲。
//!
//! # 驱逐策略
//!
//! 在所有 `ref_count == 0` 的缓冲区中选择 `last_used` 最小者，
//! 读数相同时选择下标最小者。所有缓冲区都被引用时返回
//! [`ErrorKind::Exhausted`](crate::error::ErrorKind::Exhausted)，
//! 由调用方决定重试、退避或失败，缓存内部不会自旋等待。
//!
//! 时钟有两种来源：[`BufferCache::new`] 使用逻辑时钟，每次引用计数降为 0
//! 推进一格，驱逐顺序就是严格的释放顺序；[`BufferCache::with_clock`]
//! 使用外部推进的时钟（定时器中断或 [`Ticker`](super::Ticker)），
//! 同一个 tick 内释放的缓冲区按下标打破平局。

use super::bucket::Bucket;
use super::buffer::Buffer;
use super::clock::RecencyClock;
use super::config::CacheConfig;
use super::handle::{BufferHandle, PinnedBuffer};
use crate::block::BlockDevice;
use crate::error::{Error, Result};
use crate::types::{BlockKey, BlockNo, BucketId, DeviceId, SlotIndex, Timestamp};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 总访问次数
    pub total_accesses: u64,
    /// 缓存命中次数
    pub hits: u64,
    /// 缓存未命中次数
    pub misses: u64,
    /// 回收已有身份的缓冲区次数
    pub evictions: u64,
    /// 因所有缓冲区都被引用而失败的次数
    pub exhausted: u64,
    /// 物理读取次数
    pub disk_reads: u64,
    /// 物理写入次数
    pub disk_writes: u64,
    /// 选中的牺牲者在加锁前被并发命中抢走、需要重新扫描的次数
    pub victim_rescans: u64,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_accesses as f64
        }
    }
}

/// 统计计数器
///
/// 各字段独立递增，快照不保证跨字段一致。
#[derive(Debug, Default)]
struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    exhausted: AtomicU64,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
    victim_rescans: AtomicU64,
}

impl StatCounters {
    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let exhausted = self.exhausted.load(Ordering::Relaxed);
        CacheStats {
            total_accesses: hits + misses + exhausted,
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            exhausted,
            disk_reads: self.disk_reads.load(Ordering::Relaxed),
            disk_writes: self.disk_writes.load(Ordering::Relaxed),
            victim_rescans: self.victim_rescans.load(Ordering::Relaxed),
        }
    }
}

/// 块缓存
///
/// 固定容量、多线程共享的块缓存。进程启动时构造一次，
/// 之后以引用的方式传给所有调用方，没有显式的销毁流程。
///
/// # 示例
///
/// ```rust,ignore
/// use bcache::{BufferCache, CacheConfig, MemDevice};
///
/// let cache = BufferCache::new(MemDevice::new(1024), CacheConfig::default())?;
///
/// // 读取块（必要时从设备读入）
/// let mut buf = cache.read(1, 100)?;
/// buf.data_mut()[0] = 42;
///
/// // 同步写回
/// cache.flush(&mut buf)?;
///
/// // 释放（丢弃句柄也会释放）
/// cache.release(buf);
/// ```
pub struct BufferCache<D: BlockDevice> {
    /// 配置
    config: CacheConfig,

    /// 存储传输层
    device: D,

    /// 缓冲池
    slots: Box<[Buffer]>,

    /// 哈希索引
    buckets: Box<[Bucket]>,

    /// 全局驱逐锁：串行化未命中路径
    evict_lock: Mutex<()>,

    /// 最近使用时钟
    clock: Arc<RecencyClock>,

    /// 时钟没有外部驱动，由释放路径自己推进
    logical_clock: bool,

    /// 统计信息
    stats: StatCounters,
}

impl<D: BlockDevice> BufferCache<D> {
    /// 创建新的块缓存
    ///
    /// 所有哈希桶为空，所有槽位未分配。使用逻辑时钟：
    /// 每次引用计数降为 0 时时钟推进一格，不需要外部定时器。
    pub fn new(device: D, config: CacheConfig) -> Result<Self> {
        Self::build(device, config, Arc::new(RecencyClock::new()), true)
    }

    /// 使用外部时钟创建块缓存
    ///
    /// 时钟由定时器中断或 [`Ticker`](super::Ticker) 推进，缓存只读取它。
    /// 同一个 tick 内释放的缓冲区读数相同，驱逐时按下标打破平局。
    pub fn with_clock(device: D, config: CacheConfig, clock: Arc<RecencyClock>) -> Result<Self> {
        Self::build(device, config, clock, false)
    }

    fn build(
        device: D,
        config: CacheConfig,
        clock: Arc<RecencyClock>,
        logical_clock: bool,
    ) -> Result<Self> {
        config.validate()?;

        let slots = (0..config.pool_capacity)
            .map(|_| Buffer::new(config.block_size))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let buckets = (0..config.bucket_count)
            .map(|_| Bucket::default())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        log::info!(
            "[BCACHE] init: {} buffers x {} bytes, {} buckets, {} clock",
            config.pool_capacity,
            config.block_size,
            config.bucket_count,
            if logical_clock { "logical" } else { "external" }
        );

        Ok(Self {
            config,
            device,
            slots,
            buckets,
            evict_lock: Mutex::new(()),
            clock,
            logical_clock,
            stats: StatCounters::default(),
        })
    }

    /// 获取缓冲区（不读取数据）
    ///
    /// 返回的句柄持有缓冲区独占锁，并保证缓冲区的身份是 `(dev, block)`；
    /// 数据是否有效由调用方通过 [`BufferHandle::is_valid`] 判断。
    ///
    /// # 错误
    ///
    /// 所有缓冲区都被引用时返回 `ErrorKind::Exhausted`。
    pub fn acquire(&self, dev: DeviceId, block: BlockNo) -> Result<BufferHandle<'_, D>> {
        let key = BlockKey::new(dev, block);
        let bucket = key.bucket(self.buckets.len());

        // 快速路径：只持有目标桶锁
        let hit = self.buckets[bucket]
            .list
            .lock()
            .find_map(&self.slots, &key, |meta| meta.get());
        if let Some((idx, ())) = hit {
            StatCounters::bump(&self.stats.hits);
            log::trace!("[BCACHE] acquire {} HIT slot={}", key, idx);
            return Ok(self.lock_slot(idx, key));
        }

        self.acquire_slow(key, bucket)
    }

    /// 未命中路径：在全局锁下重查、选择牺牲者并迁移哈希桶
    fn acquire_slow(&self, key: BlockKey, bucket: BucketId) -> Result<BufferHandle<'_, D>> {
        let evict_guard = self.evict_lock.lock();
        let mut target = self.buckets[bucket].list.lock();

        // 快速路径放开桶锁后，可能有另一个线程已经装入了同一个块
        if let Some((idx, ())) = target.find_map(&self.slots, &key, |meta| meta.get()) {
            drop(target);
            drop(evict_guard);
            StatCounters::bump(&self.stats.hits);
            log::trace!("[BCACHE] acquire {} HIT on recheck slot={}", key, idx);
            return Ok(self.lock_slot(idx, key));
        }

        loop {
            let Some((victim, old_bucket)) = self.select_victim() else {
                StatCounters::bump(&self.stats.exhausted);
                log::warn!(
                    "[BCACHE] acquire {} failed: all {} buffers referenced",
                    key,
                    self.slots.len()
                );
                return Err(Error::exhausted());
            };

            let mut old = match old_bucket {
                Some(ob) if ob != bucket => Some(self.buckets[ob].list.lock()),
                _ => None,
            };
            let mut meta = self.slots[victim].meta.lock();

            // 扫描之后、锁住旧桶之前，旧桶上的命中路径可能抢走了它
            if meta.is_referenced() {
                StatCounters::bump(&self.stats.victim_rescans);
                log::trace!("[BCACHE] victim slot={} taken by a concurrent hit, rescanning", victim);
                continue;
            }

            let previous = meta.key.replace(key);
            meta.get();
            if old_bucket != Some(bucket) {
                if let Some(list) = old.as_mut() {
                    list.remove(&self.slots, victim, &mut meta);
                }
                target.push_front(&self.slots, victim, &mut meta);
                meta.bucket = Some(bucket);
            }
            drop(meta);

            // ref_count 刚才为 0，独占锁不会有竞争
            let mut content = self.slots[victim].content.lock();
            if content.is_dirty() {
                if let Some(prev) = previous {
                    log::warn!("[BCACHE] discarding unflushed changes of {} (slot={})", prev, victim);
                }
            }
            content.reset();

            let bucket_len = target.len();
            drop(old);
            drop(target);
            drop(evict_guard);

            StatCounters::bump(&self.stats.misses);
            match previous {
                Some(prev) => {
                    StatCounters::bump(&self.stats.evictions);
                    log::debug!(
                        "[BCACHE] acquire {} MISS, evicted {} from slot={}, bucket {} len={}",
                        key,
                        prev,
                        victim,
                        bucket,
                        bucket_len
                    );
                }
                None => log::debug!(
                    "[BCACHE] acquire {} MISS, fresh slot={}, bucket {} len={}",
                    key,
                    victim,
                    bucket,
                    bucket_len
                ),
            }

            return Ok(BufferHandle::new(self, victim, key, content));
        }
    }

    /// 选择牺牲者：未被引用且 `last_used` 最小，平局取下标最小
    ///
    /// 调用方必须持有全局驱逐锁，保证各槽位的所属桶在此期间不变。
    fn select_victim(&self) -> Option<(SlotIndex, Option<BucketId>)> {
        let mut best: Option<(SlotIndex, Timestamp, Option<BucketId>)> = None;
        for (idx, slot) in self.slots.iter().enumerate() {
            let meta = slot.meta.lock();
            if meta.is_referenced() {
                continue;
            }
            if best.map_or(true, |(_, oldest, _)| meta.last_used < oldest) {
                best = Some((idx, meta.last_used, meta.bucket));
            }
        }
        best.map(|(idx, _, bucket)| (idx, bucket))
    }

    /// 获取已增加引用计数的槽位的独占锁（可能挂起）
    fn lock_slot(&self, idx: SlotIndex, key: BlockKey) -> BufferHandle<'_, D> {
        let content = self.slots[idx].content.lock();
        BufferHandle::new(self, idx, key, content)
    }

    /// 读取块
    ///
    /// 在 [`acquire`](Self::acquire) 的基础上，如果数据无效则从设备同步读入。
    /// 读取失败时缓冲区被释放并保持无效，下次读取会重新从设备获取。
    pub fn read(&self, dev: DeviceId, block: BlockNo) -> Result<BufferHandle<'_, D>> {
        let mut handle = self.acquire(dev, block)?;
        if !handle.is_valid() {
            self.fill(&mut handle)?;
        }
        Ok(handle)
    }

    /// 从设备读入数据
    fn fill(&self, handle: &mut BufferHandle<'_, D>) -> Result<()> {
        let key = handle.key();
        let content = handle.content_mut();
        self.device
            .read_block(key.device, key.block, &mut content.data)
            .map_err(|e| {
                log::debug!("[BCACHE] read {} failed: {}", key, e);
                e
            })?;
        content.mark_valid();
        StatCounters::bump(&self.stats.disk_reads);
        log::debug!("[BCACHE] read {} from device", key);
        Ok(())
    }

    /// 把缓冲区数据同步写入设备
    ///
    /// 持有 `&mut BufferHandle` 即持有独占锁。成功后清除脏标志，
    /// 缓存状态不变。
    pub fn flush(&self, handle: &mut BufferHandle<'_, D>) -> Result<()> {
        debug_assert!(handle.belongs_to(self), "bcache: flush through foreign cache");
        debug_assert!(
            self.slots[handle.slot()].content.is_locked(),
            "bcache: flush without holding buffer lock"
        );
        debug_assert!(self.slots[handle.slot()].meta.lock().holds(&handle.key()));

        let key = handle.key();
        let content = handle.content_mut();
        self.device.write_block(key.device, key.block, &content.data)?;
        content.mark_clean();
        StatCounters::bump(&self.stats.disk_writes);
        log::debug!("[BCACHE] flush {} to device", key);
        Ok(())
    }

    /// 释放缓冲区
    ///
    /// 放开独占锁并递减引用计数；计数降为 0 时记录当前时钟读数。
    /// 丢弃句柄有同样的效果。
    pub fn release(&self, handle: BufferHandle<'_, D>) {
        debug_assert!(handle.belongs_to(self), "bcache: release through foreign cache");
        drop(handle);
    }

    /// 递减引用计数，降为 0 时记录时钟读数
    ///
    /// 句柄释放和取消钉住都走这里；调用方不持有独占锁。
    pub(super) fn put_slot(&self, idx: SlotIndex, key: BlockKey) {
        let mut meta = self.slots[idx].meta.lock();
        debug_assert!(meta.holds(&key), "bcache: identity changed while referenced");
        if meta.put() {
            meta.last_used = self.stamp();
            log::trace!("[BCACHE] put {} slot={} at t={}", key, idx, meta.last_used);
        }
    }

    /// 当前释放时刻的时钟读数
    fn stamp(&self) -> Timestamp {
        if self.logical_clock {
            self.clock.tick()
        } else {
            self.clock.now()
        }
    }

    /// 钉住缓冲区
    ///
    /// 增加引用计数，使缓冲区在多次获取/释放之间保持驻留且不可驱逐。
    /// 不改变哈希桶成员关系。返回的 [`PinnedBuffer`] 不持有独占锁，
    /// 可以在句柄释放之后、甚至别的线程持有该缓冲区时取消钉住。
    pub fn pin(&self, handle: &BufferHandle<'_, D>) -> PinnedBuffer<'_, D> {
        debug_assert!(handle.belongs_to(self), "bcache: pin through foreign cache");
        let mut meta = self.slots[handle.slot()].meta.lock();
        debug_assert!(meta.holds(&handle.key()));
        meta.get();
        log::trace!("[BCACHE] pin {} ref_count={}", handle.key(), meta.ref_count);
        PinnedBuffer::new(self, handle.slot(), handle.key())
    }

    /// 取消钉住
    ///
    /// 只获取槽位元数据锁，不会因为别的线程持有独占锁而阻塞。
    /// 引用计数降为 0 时与释放一样记录时钟读数。
    pub fn unpin(&self, pinned: PinnedBuffer<'_, D>) {
        debug_assert!(pinned.belongs_to(self), "bcache: unpin through foreign cache");
        pinned.unpin();
    }

    /// 检查块是否在缓存中（不改变引用计数）
    ///
    /// 结果只是瞬时快照，返回后随时可能失效。
    pub fn is_cached(&self, dev: DeviceId, block: BlockNo) -> bool {
        let key = BlockKey::new(dev, block);
        self.buckets[key.bucket(self.buckets.len())]
            .list
            .lock()
            .find_map(&self.slots, &key, |_| ())
            .is_some()
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// 获取配置
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// 获取缓存容量（缓冲区数量）
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 获取哈希桶数量
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// 获取块大小
    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// 获取最近使用时钟
    pub fn clock(&self) -> &Arc<RecencyClock> {
        &self.clock
    }

    /// 获取底层设备的引用
    pub fn device(&self) -> &D {
        &self.device
    }
}

impl<D: BlockDevice> core::fmt::Debug for BufferCache<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufferCache")
            .field("capacity", &self.slots.len())
            .field("bucket_count", &self.buckets.len())
            .field("block_size", &self.config.block_size)
            .field("clock", &self.clock.now())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}
