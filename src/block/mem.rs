//! 内存块设备
//!
//! 用内存模拟多个块设备，主要用于测试和没有真实磁盘的宿主环境。
//! 从未写过的块读出来全是 0。

use super::BlockDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::types::{BlockKey, BlockNo, DeviceId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// 内存块设备
///
/// 记录物理读写次数，并支持注入读/写失败，便于验证缓存的 I/O 行为。
pub struct MemDevice {
    /// 块大小（字节）
    block_size: usize,
    /// 已写入的块
    blocks: Mutex<HashMap<BlockKey, Vec<u8>>>,
    /// 物理读取次数
    reads: AtomicU64,
    /// 物理写入次数
    writes: AtomicU64,
    /// 接下来若干次读取失败
    failing_reads: AtomicU64,
    /// 接下来若干次写入失败
    failing_writes: AtomicU64,
}

impl MemDevice {
    /// 创建内存块设备
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            blocks: Mutex::new(HashMap::new()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            failing_reads: AtomicU64::new(0),
            failing_writes: AtomicU64::new(0),
        }
    }

    /// 块大小
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// 物理读取次数
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// 物理写入次数
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// 让接下来 `count` 次读取返回 I/O 错误
    pub fn fail_next_reads(&self, count: u64) {
        self.failing_reads.store(count, Ordering::Relaxed);
    }

    /// 让接下来 `count` 次写入返回 I/O 错误
    pub fn fail_next_writes(&self, count: u64) {
        self.failing_writes.store(count, Ordering::Relaxed);
    }

    /// 绕过缓存直接预置块内容
    ///
    /// `data` 不足一个块时剩余部分补 0，超出部分被截断。
    pub fn preload(&self, dev: DeviceId, block: BlockNo, data: &[u8]) {
        let mut buf = vec![0u8; self.block_size];
        let len = data.len().min(self.block_size);
        buf[..len].copy_from_slice(&data[..len]);
        self.blocks.lock().insert(BlockKey::new(dev, block), buf);
    }

    /// 绕过缓存直接读取块内容（未写过的块返回 None）
    pub fn snapshot(&self, dev: DeviceId, block: BlockNo) -> Option<Vec<u8>> {
        self.blocks.lock().get(&BlockKey::new(dev, block)).cloned()
    }

    /// 消耗一次注入的失败
    fn take_failure(counter: &AtomicU64) -> bool {
        counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Buffer length does not match device block size",
            ));
        }
        Ok(())
    }
}

impl BlockDevice for MemDevice {
    fn read_block(&self, dev: DeviceId, block: BlockNo, buf: &mut [u8]) -> Result<()> {
        self.check_len(buf.len())?;
        if Self::take_failure(&self.failing_reads) {
            return Err(Error::new(ErrorKind::Io, "Injected read failure"));
        }

        self.reads.fetch_add(1, Ordering::Relaxed);
        match self.blocks.lock().get(&BlockKey::new(dev, block)) {
            Some(data) => buf.copy_from_slice(data),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_block(&self, dev: DeviceId, block: BlockNo, buf: &[u8]) -> Result<()> {
        self.check_len(buf.len())?;
        if Self::take_failure(&self.failing_writes) {
            return Err(Error::new(ErrorKind::Io, "Injected write failure"));
        }

        self.writes.fetch_add(1, Ordering::Relaxed);
        self.blocks.lock().insert(BlockKey::new(dev, block), buf.to_vec());
        Ok(())
    }
}

impl core::fmt::Debug for MemDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemDevice")
            .field("block_size", &self.block_size)
            .field("blocks", &self.blocks.lock().len())
            .field("reads", &self.reads())
            .field("writes", &self.writes())
            .finish()
    }
}
