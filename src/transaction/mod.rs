//! Transaction 系统
//!
//! 日志层是块缓存 pin/unpin 接口的使用者：事务中修改过的块被 pin 住，
//! 提交前不会被驱逐。
//!
//! ## 使用说明
//!
//! ```rust,ignore
//! use bcache_core::transaction::LogTransaction;
//!
//! // 开始事务
//! let mut tx = LogTransaction::begin(&cache, 10)?;
//!
//! // 执行修改
//! let mut buf = cache.read(ROOTDEV, 33)?;
//! buf[0] = 0x42;
//! tx.log_write(&buf)?;
//! drop(buf);
//!
//! // 提交事务
//! tx.commit()?;
//! ```

mod journal;

pub use journal::LogTransaction;
