//! 缓存块句柄 - RAII 风格的块访问
//!
//! - [`Buf`]：持有内容锁的句柄，`Drop` 时释放内容锁并归还引用
//! - [`BlockPin`]：不持有内容锁的 pin 引用，`Drop` 时 unpin
//!
//! 写回和释放都要求持有内容锁。这一点由类型保证：只有活着的 `Buf` 才能调用
//! [`Buf::write`]，而 [`Buf::release`] 会消耗句柄，释放之后无法再写：
//!
//! ```compile_fail
//! use bcache_core::{BufferCache, CacheConfig, MemDevice};
//!
//! let cache: BufferCache<MemDevice> =
//!     BufferCache::new(CacheConfig::new(4, 1), MemDevice::new(64, 16)).unwrap();
//! let buf = cache.read(1, 7).unwrap();
//! buf.release();
//! buf.write().unwrap();
//! ```

use super::block_cache::BufferCache;
use super::DefaultSleepLock;
use crate::block::BlockDevice;
use crate::error::Result;
use crate::types::{BlockKey, SlotId};
use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};
use lock_api::{MutexGuard, RawMutex};

/// 缓存块句柄
///
/// 由 [`BufferCache::acquire`] / [`BufferCache::read`] 返回，持有该块的内容锁。
///
/// # 示例
///
/// ```rust,ignore
/// // 读取块
/// let mut buf = cache.read(1, 10)?;
/// buf[0] = 0x42;
///
/// // 写穿到磁盘
/// buf.write()?;
///
/// // 释放（也可以直接让 buf 离开作用域）
/// buf.release();
/// ```
pub struct Buf<'a, D: BlockDevice, R: RawMutex = DefaultSleepLock> {
    cache: &'a BufferCache<D, R>,
    id: SlotId,
    key: BlockKey,
    /// 内容锁，只在 drop 时取出
    guard: Option<MutexGuard<'a, R, Vec<u8>>>,
}

impl<'a, D: BlockDevice, R: RawMutex> Buf<'a, D, R> {
    pub(crate) fn new(
        cache: &'a BufferCache<D, R>,
        id: SlotId,
        key: BlockKey,
        guard: MutexGuard<'a, R, Vec<u8>>,
    ) -> Self {
        Self {
            cache,
            id,
            key,
            guard: Some(guard),
        }
    }

    /// 缓存键
    pub fn key(&self) -> BlockKey {
        self.key
    }

    /// 设备号
    pub fn dev(&self) -> u32 {
        self.key.dev
    }

    /// 块号
    pub fn blockno(&self) -> u32 {
        self.key.blockno
    }

    /// 槽位编号
    pub fn slot_id(&self) -> SlotId {
        self.id
    }

    /// 数据是否与磁盘一致
    pub fn is_valid(&self) -> bool {
        self.cache.pool().slot(self.id).is_valid()
    }

    /// 块数据
    pub fn data(&self) -> &[u8] {
        match &self.guard {
            Some(guard) => guard.as_slice(),
            None => unreachable!("buffer used after release"),
        }
    }

    /// 可变块数据
    pub fn data_mut(&mut self) -> &mut [u8] {
        match &mut self.guard {
            Some(guard) => guard.as_mut_slice(),
            None => unreachable!("buffer used after release"),
        }
    }

    /// 如果数据无效，从设备加载
    ///
    /// 只在内容锁下进行，同一块的并发读者中只有第一个拿到内容锁的会真正读盘
    pub fn load(&mut self) -> Result<()> {
        if self.is_valid() {
            return Ok(());
        }
        let cache = self.cache;
        let key = self.key;
        cache.bdev().read_block(key, self.data_mut())?;
        cache.pool().slot(self.id).set_valid(true);
        cache.count_load();
        log::trace!("[BCACHE] load {} into slot={}", key, self.id);
        Ok(())
    }

    /// 强制标记为无效，下次 [`BufferCache::read`] 会重新从设备加载
    pub fn invalidate(&mut self) {
        self.cache.pool().slot(self.id).set_valid(false);
    }

    /// 把块数据写穿到设备
    ///
    /// 写入的内容即为当前内容，写成功后数据与磁盘一致
    pub fn write(&self) -> Result<()> {
        self.cache.bdev().write_block(self.key, self.data())?;
        self.cache.pool().slot(self.id).set_valid(true);
        self.cache.count_write();
        log::trace!("[BCACHE] bwrite {} from slot={}", self.key, self.id);
        Ok(())
    }

    /// 增加 pin 引用，使该块在 pin 释放前不会被驱逐
    ///
    /// pin 与内容锁无关，返回的 [`BlockPin`] 可以比句柄活得更久
    pub fn pin(&self) -> BlockPin<'a, D, R> {
        self.cache.pin_slot(self.id);
        log::trace!("[BCACHE] bpin {} slot={}", self.key, self.id);
        BlockPin {
            cache: self.cache,
            id: self.id,
            key: self.key,
        }
    }

    /// 释放句柄：先放内容锁，再归还引用
    pub fn release(self) {
        drop(self);
    }

    pub(crate) fn cache(&self) -> &'a BufferCache<D, R> {
        self.cache
    }
}

impl<D: BlockDevice, R: RawMutex> Deref for Buf<'_, D, R> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data()
    }
}

impl<D: BlockDevice, R: RawMutex> DerefMut for Buf<'_, D, R> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data_mut()
    }
}

impl<D: BlockDevice, R: RawMutex> Drop for Buf<'_, D, R> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            drop(guard);
            self.cache.release_slot(self.id, self.key);
        }
    }
}

impl<D: BlockDevice, R: RawMutex> core::fmt::Debug for Buf<'_, D, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Buf")
            .field("key", &self.key)
            .field("slot", &self.id)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// pin 引用
///
/// 由 [`Buf::pin`] / [`BufferCache::pin`] 返回。持有期间块的引用计数至少为 1，
/// 不会被选为驱逐对象。`Drop` 时自动 unpin。
#[must_use = "dropping a BlockPin unpins the block immediately"]
pub struct BlockPin<'a, D: BlockDevice, R: RawMutex = DefaultSleepLock> {
    cache: &'a BufferCache<D, R>,
    id: SlotId,
    key: BlockKey,
}

impl<D: BlockDevice, R: RawMutex> BlockPin<'_, D, R> {
    /// 缓存键
    pub fn key(&self) -> BlockKey {
        self.key
    }

    /// 释放 pin 引用
    pub fn unpin(self) {
        drop(self);
    }
}

impl<D: BlockDevice, R: RawMutex> Drop for BlockPin<'_, D, R> {
    fn drop(&mut self) {
        self.cache.unpin_slot(self.id);
        log::trace!("[BCACHE] bunpin {} slot={}", self.key, self.id);
    }
}

impl<D: BlockDevice, R: RawMutex> core::fmt::Debug for BlockPin<'_, D, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockPin")
            .field("key", &self.key)
            .field("slot", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::block::MemDevice;
    use crate::cache::BufferCache;
    use crate::types::{BlockKey, CacheConfig};

    type TestCache = BufferCache<MemDevice, spin::Mutex<()>>;

    fn cache(nbuf: usize) -> TestCache {
        BufferCache::new(CacheConfig::new(nbuf, 1), MemDevice::new(32, 64)).unwrap()
    }

    #[test]
    fn test_handle_accessors() {
        let cache = cache(2);
        let buf = cache.read(3, 11).unwrap();
        assert_eq!(buf.key(), BlockKey::new(3, 11));
        assert_eq!(buf.dev(), 3);
        assert_eq!(buf.blockno(), 11);
        assert_eq!(buf.len(), 32);
    }

    #[test]
    fn test_acquire_without_load() {
        let cache = cache(2);
        let buf = cache.get_noread(1, 1);
        assert!(!buf.is_valid());
        assert_eq!(cache.physical_read_count(), 0);
    }

    #[test]
    fn test_write_through() {
        let cache = cache(2);
        let mut buf = cache.get_noread(1, 4);
        buf.fill(0x5A);
        buf.write().unwrap();
        assert!(buf.is_valid());
        buf.release();

        assert_eq!(cache.device().peek(1, 4).unwrap(), alloc::vec![0x5Au8; 32]);
        assert_eq!(cache.physical_write_count(), 1);
        assert_eq!(cache.stats().writes, 1);

        // 写穿之后再读不需要访问设备
        let buf = cache.read(1, 4).unwrap();
        assert_eq!(buf[0], 0x5A);
        assert_eq!(cache.physical_read_count(), 0);
    }

    #[test]
    fn test_invalidate_reloads_same_bytes() {
        let cache = cache(2);
        let mut buf = cache.read(1, 2).unwrap();
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = i as u8;
        }
        buf.write().unwrap();
        let written = buf.to_vec();

        // 篡改缓存中的数据后强制失效，重新读取应得到磁盘上的内容
        buf.fill(0);
        buf.invalidate();
        buf.release();

        let buf = cache.read(1, 2).unwrap();
        assert_eq!(&buf[..], &written[..]);
        assert_eq!(cache.physical_read_count(), 2);
    }

    #[test]
    fn test_write_error_propagates() {
        let cache = cache(2);
        let buf = cache.read(1, 1).unwrap();
        cache.device().set_fail_writes(true);
        let err = buf.write().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
        assert_eq!(cache.stats().writes, 0);
    }

    #[test]
    fn test_drop_releases() {
        let cache = cache(1);
        {
            let _buf = cache.read(1, 1).unwrap();
            assert_eq!(cache.ref_count(1, 1), Some(1));
        }
        assert_eq!(cache.ref_count(1, 1), Some(0));
        // 唯一的槽位可以再次使用
        let _buf = cache.read(1, 2).unwrap();
    }

    #[test]
    fn test_pin_outlives_handle() {
        let cache = cache(2);
        let buf = cache.read(1, 8).unwrap();
        let pin = buf.pin();
        assert_eq!(cache.ref_count(1, 8), Some(2));
        buf.release();
        assert_eq!(cache.ref_count(1, 8), Some(1));
        assert_eq!(pin.key(), BlockKey::new(1, 8));
        pin.unpin();
        assert_eq!(cache.ref_count(1, 8), Some(0));
    }

    #[test]
    fn test_second_reader_skips_reload() {
        let cache = cache(2);
        let first = cache.acquire(1, 6);
        assert!(!first.is_valid());
        drop(first);

        // 第一个持有者没有加载，下一个读者负责加载
        let buf = cache.read(1, 6).unwrap();
        assert!(buf.is_valid());
        drop(buf);
        let _buf = cache.read(1, 6).unwrap();
        assert_eq!(cache.physical_read_count(), 1);
    }
}
