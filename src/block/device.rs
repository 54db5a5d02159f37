//! 存储传输层接口

use crate::error::Result;
use crate::types::{BlockNo, DeviceId};
use std::sync::Arc;

/// 块设备接口
///
/// 缓存通过此 trait 完成真正的块读写。缓存只会在持有目标缓冲区的
/// 独占锁时调用这两个方法，因此实现者不会看到同一个块的并发读写；
/// 但不同块的读写可能来自不同线程并发调用，所以要求 `Send + Sync`。
///
/// `buf` 的长度总是等于缓存配置的块大小。
///
/// # 示例
///
/// ```rust,ignore
/// use bcache::{BlockDevice, BlockNo, DeviceId, Result};
///
/// struct VirtioDisk {
///     // ...
/// }
///
/// impl BlockDevice for VirtioDisk {
///     fn read_block(&self, dev: DeviceId, block: BlockNo, buf: &mut [u8]) -> Result<()> {
///         // 提交读请求并同步等待完成
///         Ok(())
///     }
///
///     fn write_block(&self, dev: DeviceId, block: BlockNo, buf: &[u8]) -> Result<()> {
///         // 提交写请求并同步等待完成
///         Ok(())
///     }
/// }
/// ```
pub trait BlockDevice: Send + Sync {
    /// 同步读取一个块到 `buf`
    fn read_block(&self, dev: DeviceId, block: BlockNo, buf: &mut [u8]) -> Result<()>;

    /// 同步把 `buf` 写入一个块
    fn write_block(&self, dev: DeviceId, block: BlockNo, buf: &[u8]) -> Result<()>;
}

impl<T: BlockDevice + ?Sized> BlockDevice for &T {
    fn read_block(&self, dev: DeviceId, block: BlockNo, buf: &mut [u8]) -> Result<()> {
        (**self).read_block(dev, block, buf)
    }

    fn write_block(&self, dev: DeviceId, block: BlockNo, buf: &[u8]) -> Result<()> {
        (**self).write_block(dev, block, buf)
    }
}

impl<T: BlockDevice + ?Sized> BlockDevice for Arc<T> {
    fn read_block(&self, dev: DeviceId, block: BlockNo, buf: &mut [u8]) -> Result<()> {
        (**self).read_block(dev, block, buf)
    }

    fn write_block(&self, dev: DeviceId, block: BlockNo, buf: &[u8]) -> Result<()> {
        (**self).write_block(dev, block, buf)
    }
}
