//! 日志事务
//!
//! 上层（文件系统）修改缓存块后调用 [`LogTransaction::log_write`] 登记该块。
//! 登记的块被 pin 住，在事务提交前不会被驱逐，修改因此一直留在缓存里。
//!
//! ## 工作原理
//!
//! 1. **登记**: `log_write` 对块 pin 一次，同一块重复登记只算一次（吸收）
//! 2. **提交**: 依次重新获取每个块，写穿到磁盘，然后 unpin
//! 3. **放弃**: 直接 unpin，不写磁盘（缓存中的修改保留，但不会落盘）
//!
//! ## 限制
//!
//! - ❌ 无崩溃恢复保证（没有单独的日志区，提交即逐块写回）
//! - ⚠️ 提交前调用者必须已经释放所有登记过的 [`Buf`]，否则会在内容锁上自锁

use crate::{
    block::BlockDevice,
    cache::{BlockPin, Buf, BufferCache},
    error::{Error, ErrorKind, Result},
    types::BlockKey,
};
use alloc::vec::Vec;
use lock_api::RawMutex;

/// 日志事务
pub struct LogTransaction<'a, D: BlockDevice, R: RawMutex> {
    /// 块缓存引用
    cache: &'a BufferCache<D, R>,

    /// 在此事务中登记的块（每个块持有一个 pin）
    pinned: Vec<BlockPin<'a, D, R>>,

    /// 最多登记的块数
    max_blocks: usize,
}

impl<'a, D: BlockDevice, R: RawMutex> LogTransaction<'a, D, R> {
    /// 开始新事务
    ///
    /// # 参数
    ///
    /// * `cache` - 块缓存
    /// * `max_blocks` - 最多登记的块数，应小于缓存容量，否则 pin 住的块会耗尽缓存
    pub fn begin(cache: &'a BufferCache<D, R>, max_blocks: usize) -> Result<Self> {
        if max_blocks == 0 || max_blocks >= cache.capacity() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Transaction size must be between 1 and cache capacity - 1",
            ));
        }
        Ok(Self {
            cache,
            pinned: Vec::with_capacity(max_blocks),
            max_blocks,
        })
    }

    /// 使用默认大小开始新事务
    pub fn begin_default(cache: &'a BufferCache<D, R>) -> Result<Self> {
        Self::begin(cache, crate::consts::DEFAULT_LOG_BLOCKS)
    }

    /// 登记一个已修改的块
    ///
    /// # 错误
    ///
    /// - `InvalidInput`: 块属于另一个缓存
    /// - `NoSpace`: 登记的块数已达上限
    pub fn log_write(&mut self, buf: &Buf<'a, D, R>) -> Result<()> {
        if !core::ptr::eq(buf.cache(), self.cache) {
            return Err(Error::new(ErrorKind::InvalidInput, "Buffer belongs to another cache"));
        }

        let key = buf.key();
        if self.contains(key) {
            log::trace!("[LOG] absorb {}", key);
            return Ok(());
        }

        if self.pinned.len() >= self.max_blocks {
            log::warn!("[LOG] transaction full ({} blocks), cannot log {}", self.max_blocks, key);
            return Err(Error::new(ErrorKind::NoSpace, "Too big a transaction"));
        }

        self.pinned.push(buf.pin());
        log::debug!("[LOG] logged {}, {} blocks in transaction", key, self.pinned.len());
        Ok(())
    }

    /// 块是否已登记
    pub fn contains(&self, key: BlockKey) -> bool {
        self.pinned.iter().any(|pin| pin.key() == key)
    }

    /// 已登记的块数
    pub fn len(&self) -> usize {
        self.pinned.len()
    }

    /// 是否没有登记任何块
    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty()
    }

    /// 提交事务
    ///
    /// 按登记顺序把每个块写穿到磁盘并 unpin，返回写回的块数。
    /// 写回的是缓存中的当前内容，即使该块从未从磁盘加载过（`get_noread` 整块覆盖）。
    ///
    /// 中途写失败时，剩余的块全部 unpin 而不写回。
    pub fn commit(mut self) -> Result<usize> {
        let count = self.pinned.len();
        for pin in self.pinned.drain(..) {
            let key = pin.key();
            // 不能用 read：整块覆盖的块仍是无效状态，read 会用磁盘旧数据覆盖修改
            let buf = self.cache.acquire(key.dev, key.blockno);
            if let Err(e) = buf.write() {
                return Err(Error::with_cause(
                    ErrorKind::Io,
                    "Failed to write block during commit",
                    e,
                ));
            }
            buf.release();
            pin.unpin();
        }
        log::debug!("[LOG] committed {} blocks", count);
        Ok(count)
    }

    /// 放弃事务，unpin 所有块，不写磁盘
    pub fn abort(self) {
        log::debug!("[LOG] aborted {} blocks", self.pinned.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemDevice;
    use crate::types::CacheConfig;

    type TestCache = BufferCache<MemDevice, spin::Mutex<()>>;

    fn cache(nbuf: usize) -> TestCache {
        BufferCache::new(CacheConfig::new(nbuf, 1), MemDevice::new(16, 64)).unwrap()
    }

    #[test]
    fn test_begin_rejects_oversized() {
        let cache = cache(4);
        assert!(LogTransaction::begin(&cache, 4).is_err());
        assert!(LogTransaction::begin(&cache, 0).is_err());
        assert!(LogTransaction::begin(&cache, 3).is_ok());
    }

    #[test]
    fn test_log_write_pins_and_absorbs() {
        let cache = cache(4);
        let mut tx = LogTransaction::begin(&cache, 2).unwrap();

        let mut buf = cache.read(1, 5).unwrap();
        buf[0] = 1;
        tx.log_write(&buf).unwrap();
        tx.log_write(&buf).unwrap();
        buf.release();

        assert_eq!(tx.len(), 1);
        assert!(tx.contains(BlockKey::new(1, 5)));
        assert_eq!(cache.ref_count(1, 5), Some(1));
        tx.abort();
        assert_eq!(cache.ref_count(1, 5), Some(0));
    }

    #[test]
    fn test_commit_writes_through_and_unpins() {
        let cache = cache(4);
        let mut tx = LogTransaction::begin(&cache, 3).unwrap();

        for blockno in [3, 7] {
            let mut buf = cache.read(1, blockno).unwrap();
            buf.fill(blockno as u8);
            tx.log_write(&buf).unwrap();
        }

        // 提交前磁盘上没有数据
        assert!(cache.device().peek(1, 3).is_none());

        assert_eq!(tx.commit().unwrap(), 2);
        assert_eq!(cache.device().peek(1, 3).unwrap(), alloc::vec![3u8; 16]);
        assert_eq!(cache.device().peek(1, 7).unwrap(), alloc::vec![7u8; 16]);
        assert_eq!(cache.ref_count(1, 3), Some(0));
        assert_eq!(cache.ref_count(1, 7), Some(0));
        // 提交时块仍在缓存中，没有重新读盘
        assert_eq!(cache.physical_read_count(), 2);
    }

    #[test]
    fn test_commit_keeps_overwritten_block() {
        let cache = cache(4);
        cache.device().poke(1, 5, &[0x11u8; 16]).unwrap();
        let mut tx = LogTransaction::begin(&cache, 2).unwrap();

        // 整块覆盖，不读旧内容
        let mut buf = cache.get_noread(1, 5);
        assert!(!buf.is_valid());
        buf.fill(0xAB);
        tx.log_write(&buf).unwrap();
        buf.release();

        assert_eq!(tx.commit().unwrap(), 1);
        assert_eq!(cache.device().peek(1, 5).unwrap(), alloc::vec![0xABu8; 16]);
        assert_eq!(cache.physical_read_count(), 0);

        // 写穿之后缓存内容有效，再读命中
        let buf = cache.read(1, 5).unwrap();
        assert!(buf.is_valid());
        assert_eq!(buf[0], 0xAB);
        assert_eq!(cache.physical_read_count(), 0);
    }

    #[test]
    fn test_logged_blocks_survive_pressure() {
        let cache = cache(3);
        let mut tx = LogTransaction::begin(&cache, 1).unwrap();

        let mut buf = cache.read(1, 0).unwrap();
        buf[0] = 0xEE;
        tx.log_write(&buf).unwrap();
        buf.release();

        for blockno in 1..10 {
            cache.read(1, blockno).unwrap().release();
        }
        assert!(cache.is_cached(1, 0));

        tx.commit().unwrap();
        assert_eq!(cache.device().peek(1, 0).unwrap()[0], 0xEE);
    }

    #[test]
    fn test_transaction_full() {
        let cache = cache(4);
        let mut tx = LogTransaction::begin(&cache, 1).unwrap();

        let a = cache.read(1, 1).unwrap();
        tx.log_write(&a).unwrap();
        let b = cache.read(1, 2).unwrap();
        let err = tx.log_write(&b).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSpace);
    }

    #[test]
    fn test_commit_failure_unpins_rest() {
        let cache = cache(4);
        let mut tx = LogTransaction::begin(&cache, 2).unwrap();
        for blockno in [1, 2] {
            let buf = cache.read(1, blockno).unwrap();
            tx.log_write(&buf).unwrap();
        }

        cache.device().set_fail_writes(true);
        assert_eq!(tx.commit().unwrap_err().kind(), ErrorKind::Io);
        assert_eq!(cache.ref_count(1, 1), Some(0));
        assert_eq!(cache.ref_count(1, 2), Some(0));
    }

    #[test]
    fn test_foreign_buffer_rejected() {
        let a = cache(4);
        let b = cache(4);
        let mut tx = LogTransaction::begin(&a, 2).unwrap();
        let buf = b.read(1, 1).unwrap();
        assert_eq!(tx.log_write(&buf).unwrap_err().kind(), ErrorKind::InvalidInput);
    }
}
