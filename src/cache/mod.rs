//! 块缓存模块
//!
//! 固定容量、多线程并发访问的块缓存（buffer cache），位于块设备和上层
//! （文件系统、日志）之间。
//!
//! # 主要组件
//!
//! - [`BufferPool`] / [`Slot`] - 固定大小的缓存块数组，每块一把内容锁
//! - [`BufferCache`] - 分桶索引：查找或分配、释放、pin/unpin
//! - [`Buf`] / [`BlockPin`] - RAII 句柄
//! - [`GlobalCache`] - 进程级单例
//! - [`CacheStats`] - 缓存统计信息
//!
//! # 设计原理
//!
//! 所有缓存块按块号散列到若干个桶，每个桶一把自旋锁、一条 LRU 链表。
//! 与“一把全局锁 + 一条全局链表”相比，不同桶上的查找互不阻塞，代价是
//! LRU 顺序只在桶内严格成立。
//!
//! 主桶没有空闲块时，从其他桶窃取一个空闲块并迁移到主桶。窃取分两步：
//! 锁源桶摘除、解锁，再锁主桶插入，任何时刻最多持有一把桶锁，不会形成环形等待。
//!
//! | xv6 bio                   | bcache_core                         |
//! |---------------------------|-------------------------------------|
//! | `struct buf buf[NBUF]`    | [`BufferPool`]                      |
//! | `struct bucket`           | 桶（`spin::Mutex` + `LruCache`）     |
//! | `binit()`                 | [`BufferCache::new()`]              |
//! | `bget()`                  | [`BufferCache::acquire()`]          |
//! | `bread()`                 | [`BufferCache::read()`]             |
//! | `bwrite()`                | [`Buf::write()`]                    |
//! | `brelse()`                | [`Buf::release()`] / `Drop`         |
//! | `bpin()` / `bunpin()`     | [`Buf::pin()`] / [`BlockPin::unpin()`] |
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use bcache_core::{BufferCache, CacheConfig};
//!
//! let cache = BufferCache::new(CacheConfig::default(), disk)?;
//!
//! let mut buf = cache.read(ROOTDEV, 1)?;
//! buf[0] = 42;
//! buf.write()?;
//! drop(buf);
//!
//! let stats = cache.stats();
//! log::info!("hit rate {:.2}", stats.hit_rate());
//! ```

mod block_cache;
mod buffer;
mod global;
mod handle;
mod pool;
mod shard;

pub use block_cache::{BufferCache, CacheStats};
pub use buffer::Slot;
pub use global::GlobalCache;
pub use handle::{BlockPin, Buf};
pub use pool::BufferPool;

/// 缓存块内容锁的默认实现（std 环境下的睡眠锁）
#[cfg(feature = "std")]
pub type DefaultSleepLock = parking_lot::RawMutex;

/// 缓存块内容锁的默认实现
///
/// no_std 环境下没有调度器，默认退化为自旋锁；内核应通过类型参数传入自己的睡眠锁
#[cfg(not(feature = "std"))]
pub type DefaultSleepLock = spin::Mutex<()>;
