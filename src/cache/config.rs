//! 缓存配置

use crate::consts::{DEFAULT_BLOCK_SIZE, DEFAULT_BUCKET_COUNT, DEFAULT_POOL_CAPACITY, MAX_BLOCK_SIZE};
use crate::error::{Error, ErrorKind, Result};

/// 缓存配置
///
/// 在缓存初始化时确定，之后不可更改。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// 缓冲区数量（缓存的块数）
    pub pool_capacity: usize,
    /// 哈希桶数量（查找的并行度）
    pub bucket_count: usize,
    /// 块大小（字节）
    pub block_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            pool_capacity: DEFAULT_POOL_CAPACITY,
            bucket_count: DEFAULT_BUCKET_COUNT,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl CacheConfig {
    /// 设置缓冲区数量
    pub fn with_pool_capacity(mut self, pool_capacity: usize) -> Self {
        self.pool_capacity = pool_capacity;
        self
    }

    /// 设置哈希桶数量
    pub fn with_bucket_count(mut self, bucket_count: usize) -> Self {
        self.bucket_count = bucket_count;
        self
    }

    /// 设置块大小
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.pool_capacity == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "Pool capacity must be non-zero"));
        }
        if self.bucket_count == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "Bucket count must be non-zero"));
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Block size must be between 1 and MAX_BLOCK_SIZE bytes",
            ));
        }
        Ok(())
    }
}
