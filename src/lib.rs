//! bcache_core: 分桶并发块缓存
//!
//! 这是一个纯 Rust 实现的块缓存（buffer cache）库，位于块设备驱动和文件系统 /
//! 日志层之间，旨在提供：
//! - **固定容量**：启动时分配所有缓存块，运行期不再分配
//! - **分桶加锁**：按块号散列到多个桶，不同桶上的访问互不阻塞
//! - **跨桶窃取**：主桶满时从其他桶借用空闲块，任何时刻最多持有一把桶锁
//! - **RAII 句柄**：持有句柄即持有内容锁，释放后无法再访问数据
//! - **no_std**：只依赖 `alloc`，内容锁的实现可由内核替换
//!
//! # 示例
//!
//! ```rust,ignore
//! use bcache_core::{BufferCache, CacheConfig, MemDevice, Result};
//!
//! fn main() -> Result<()> {
//!     let cache: BufferCache<MemDevice> =
//!         BufferCache::new(CacheConfig::default(), MemDevice::with_default_block_size(1000))?;
//!
//!     // 读取块
//!     let mut buf = cache.read(1, 0)?;
//!     buf[0] = 0x42;
//!
//!     // 写穿到设备
//!     buf.write()?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`block`] - 块设备抽象
//! - [`consts`] - 常量定义
//! - [`types`] - 数据结构定义
//! - [`cache`] - 块缓存
//! - [`transaction`] - 日志事务

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 块设备抽象
pub mod block;

/// 常量定义
pub mod consts;

/// 数据结构定义
pub mod types;

/// 块缓存
pub mod cache;

/// Transaction 系统
pub mod transaction;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 块设备
pub use block::{BlockDevice, BlockDev, MemDevice};

// 数据结构
pub use types::{BlockKey, CacheConfig, SlotId};

// Cache
pub use cache::{BlockPin, Buf, BufferCache, CacheStats, DefaultSleepLock, GlobalCache};

// Transaction
pub use transaction::LogTransaction;
