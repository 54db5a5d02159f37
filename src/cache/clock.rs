//! 最近使用时钟
//!
//! 单调递增的计数器，由环境的定时器推进（例如时钟中断每次调用 [`RecencyClock::tick`]）。
//! 缓冲区在引用计数降为 0 时记录当前读数，驱逐时选择读数最小的空闲缓冲区。
//!
//! 同一个 tick 内释放的缓冲区读数相同，此时按槽位下标从小到大打破平局，
//! 因此 LRU 的精度取决于定时器的频率。

use crate::consts::CLOCK_START;
use crate::error::{Error, ErrorKind, Result};
use crate::types::Timestamp;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// 最近使用时钟
#[derive(Debug)]
pub struct RecencyClock {
    ticks: AtomicU64,
}

impl RecencyClock {
    /// 创建时钟，从 [`CLOCK_START`] 开始计数
    pub fn new() -> Self {
        Self {
            ticks: AtomicU64::new(CLOCK_START),
        }
    }

    /// 当前读数
    #[inline]
    pub fn now(&self) -> Timestamp {
        self.ticks.load(Ordering::Acquire)
    }

    /// 推进一个 tick，返回推进后的读数
    #[inline]
    pub fn tick(&self) -> Timestamp {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Default for RecencyClock {
    fn default() -> Self {
        Self::new()
    }
}

/// 定时推进时钟的后台线程
///
/// 在没有时钟中断的宿主环境中模拟定时器。Drop 时停止线程并等待其退出。
///
/// # 示例
///
/// ```rust,ignore
/// let clock = Arc::new(RecencyClock::new());
/// let cache = BufferCache::with_clock(device, CacheConfig::default(), clock.clone())?;
/// let _ticker = Ticker::spawn(clock, Duration::from_millis(10))?;
/// ```
pub struct Ticker {
    stop: Arc<AtomicBool>,
    /// 只在 Drop 中取出
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// 启动后台线程，每隔 `period` 推进一次 `clock`
    ///
    /// 线程创建失败时返回 `ErrorKind::Io`。
    pub fn spawn(clock: Arc<RecencyClock>, period: Duration) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = std::thread::Builder::new()
            .name("bcache-ticker".into())
            .spawn(move || {
                log::debug!("[CLOCK] ticker started, period={:?}", period);
                while !flag.load(Ordering::Relaxed) {
                    std::thread::sleep(period);
                    clock.tick();
                }
                log::debug!("[CLOCK] ticker stopped at {}", clock.now());
            });

        let handle = handle.map_err(|e| {
            log::error!("[CLOCK] failed to spawn ticker thread: {}", e);
            Error::new(ErrorKind::Io, "Failed to spawn ticker thread")
        })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// 后台线程是否在运行
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::NEVER_USED;

    #[test]
    fn test_clock_starts_after_never_used() {
        let clock = RecencyClock::new();
        assert_eq!(clock.now(), CLOCK_START);
        assert!(clock.now() > NEVER_USED);
    }

    #[test]
    fn test_tick_is_monotonic() {
        let clock = RecencyClock::new();
        let a = clock.now();
        let b = clock.tick();
        let c = clock.tick();
        assert_eq!(b, a + 1);
        assert_eq!(c, b + 1);
        assert_eq!(clock.now(), c);
    }

    #[test]
    fn test_concurrent_ticks() {
        let clock = RecencyClock::new();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        clock.tick();
                    }
                });
            }
        });
        assert_eq!(clock.now(), CLOCK_START + 4000);
    }

    #[test]
    fn test_ticker_advances_clock() {
        let clock = Arc::new(RecencyClock::new());
        let start = clock.now();
        {
            let ticker = Ticker::spawn(clock.clone(), Duration::from_millis(1)).unwrap();
            assert!(ticker.is_running());
            while clock.now() < start + 3 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        // 线程已停止，读数不再变化
        let stopped = clock.now();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(clock.now(), stopped);
    }
}
