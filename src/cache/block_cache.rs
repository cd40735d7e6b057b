//! 分桶块缓存实现
//!
//! # 结构
//!
//! ```text
//! struct BufferCache {
//!     pool: BufferPool,              // 固定槽位数组，每个槽位一把内容锁
//!     shards: Vec<Mutex<Shard>>,     // 每个桶一把自旋锁 + 一条 LRU 链表
//!     bdev: BlockDev,                // 底层设备
//!     stats: StatCounters,
//! }
//! ```
//!
//! # 加锁规则
//!
//! 1. 桶锁只保护链表结构、身份和引用计数，临界区内不做任何 I/O
//! 2. 任何时刻最多持有一把桶锁，跨桶窃取分两步：先从源桶摘除并解锁，再锁主桶插入
//! 3. 内容锁在释放桶锁之后才获取，可以跨越磁盘读写
//! 4. 释放时先放内容锁，再回到桶锁下减少引用计数

use super::buffer::SlotMeta;
use super::handle::{BlockPin, Buf};
use super::pool::BufferPool;
use super::shard::Shard;
use super::DefaultSleepLock;
use crate::block::{BlockDev, BlockDevice};
use crate::error::Result;
use crate::types::{BlockKey, CacheConfig, SlotId};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use lock_api::RawMutex;
use spin::Mutex;

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// 在主桶中命中的次数
    pub hits: u64,
    /// 未命中次数
    pub misses: u64,
    /// 跨桶窃取次数
    pub steals: u64,
    /// 窃取后发现其他线程已缓存同一块的次数
    pub steal_races: u64,
    /// 从设备加载的次数
    pub loads: u64,
    /// 写穿到设备的次数
    pub writes: u64,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    steals: AtomicU64,
    steal_races: AtomicU64,
    loads: AtomicU64,
    writes: AtomicU64,
}

impl StatCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            steals: self.steals.load(Ordering::Relaxed),
            steal_races: self.steal_races.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

/// 分桶块缓存
///
/// 固定数量的缓存块按块号分布到若干个桶中，每个桶独立加锁、独立维护 LRU 顺序。
///
/// `R` 是缓存块内容锁的底层实现（睡眠锁）。启用 `std` 时默认为
/// `parking_lot::RawMutex`，否则默认为 `spin::Mutex<()>`；内核可以换成自己的睡眠锁。
///
/// # 示例
///
/// ```rust,ignore
/// use bcache_core::{BufferCache, CacheConfig, MemDevice};
///
/// let cache = BufferCache::new(CacheConfig::new(30, 13), MemDevice::new(1024, 1000))?;
///
/// let mut buf = cache.read(1, 42)?;
/// buf[0] = 0x42;
/// buf.write()?;
/// buf.release();
/// ```
pub struct BufferCache<D, R = DefaultSleepLock> {
    pool: BufferPool<R>,
    shards: Vec<Mutex<Shard>>,
    bdev: BlockDev<D>,
    stats: StatCounters,
}

impl<D: BlockDevice, R: RawMutex> BufferCache<D, R> {
    /// 创建块缓存
    ///
    /// 所有槽位按编号轮流分配到各个桶中
    pub fn new(config: CacheConfig, device: D) -> Result<Self> {
        config.validate()?;
        let bdev = BlockDev::new(device)?;
        let pool = BufferPool::new(config.nbuf, bdev.block_size());

        let mut shards: Vec<Shard> = (0..config.nbucket).map(|_| Shard::new()).collect();
        for slot in pool.iter() {
            let bucket = slot.id() % config.nbucket;
            slot.set_shard(bucket);
            shards[bucket].link_mru(slot.id(), SlotMeta::free());
        }

        log::debug!(
            "[BCACHE] init: {} buffers, {} buckets, block size {}",
            config.nbuf,
            config.nbucket,
            bdev.block_size()
        );

        Ok(Self {
            pool,
            shards: shards.into_iter().map(Mutex::new).collect(),
            bdev,
            stats: StatCounters::default(),
        })
    }

    /// 使用默认配置创建块缓存
    pub fn with_default_config(device: D) -> Result<Self> {
        Self::new(CacheConfig::default(), device)
    }

    /// 获取块并加内容锁，不读取磁盘
    ///
    /// 返回的句柄身份等于 `(dev, blockno)`，引用计数已经加一。
    /// 如果是新分配的槽位，`is_valid()` 为 `false`，数据是上一个块的残留。
    ///
    /// # Panics
    ///
    /// 所有缓存块都被引用时 panic（容量耗尽）
    pub fn acquire(&self, dev: u32, blockno: u32) -> Buf<'_, D, R> {
        let key = BlockKey::new(dev, blockno);
        let id = self.bget(key);
        let guard = self.pool.slot(id).lock();
        Buf::new(self, id, key, guard)
    }

    /// 获取块用于整块覆盖写（不读取磁盘）
    ///
    /// 与 [`acquire`](Self::acquire) 相同，单独命名以表明调用者不关心旧内容
    pub fn get_noread(&self, dev: u32, blockno: u32) -> Buf<'_, D, R> {
        self.acquire(dev, blockno)
    }

    /// 读取块：获取句柄，如果数据无效则从设备加载
    ///
    /// 加载只在内容锁下进行，不持有任何桶锁。
    /// 加载失败时句柄被释放，槽位保持无效，下次读取会重新加载。
    pub fn read(&self, dev: u32, blockno: u32) -> Result<Buf<'_, D, R>> {
        let mut buf = self.acquire(dev, blockno);
        buf.load()?;
        Ok(buf)
    }

    /// 为句柄增加一个 pin 引用，使其在事务结束前不会被驱逐
    ///
    /// # Panics
    ///
    /// 句柄不属于本缓存时 panic
    pub fn pin<'a>(&'a self, buf: &Buf<'a, D, R>) -> BlockPin<'a, D, R> {
        if !core::ptr::eq(buf.cache(), self) {
            log::error!("[BCACHE] pin: buffer {} belongs to another cache", buf.key());
            panic!("bpin: buffer belongs to another cache");
        }
        buf.pin()
    }

    /// 释放 pin 引用
    pub fn unpin(&self, pin: BlockPin<'_, D, R>) {
        pin.unpin();
    }

    // ===== 内部实现 =====

    /// 查找或分配槽位，返回时引用计数已加一
    fn bget(&self, key: BlockKey) -> SlotId {
        let home = key.home(self.shards.len());
        {
            let mut shard = self.shards[home].lock();

            // 第一步：在主桶中查找
            if let Some(id) = shard.find(key) {
                shard.get_ref(id);
                StatCounters::bump(&self.stats.hits);
                log::trace!("[BCACHE] bget {} HIT slot={}", key, id);
                return id;
            }
            StatCounters::bump(&self.stats.misses);

            // 第二步：在主桶中找最久未使用的空闲槽位，原地复用
            if let Some(id) = shard.find_free() {
                shard.assign(id, key);
                self.pool.slot(id).set_valid(false);
                log::debug!("[BCACHE] bget {} MISS, recycled slot={} in bucket {}", key, id, home);
                return id;
            }
        }

        // 第三步：主桶已满，从其他桶窃取
        self.steal(home, key)
    }

    /// 跨桶窃取空闲槽位
    ///
    /// 源桶和主桶依次加锁，绝不同时持有两把桶锁。
    /// 重新锁住主桶后会再查找一次：如果其他线程在窗口期内已经缓存了同一个块，
    /// 窃取来的槽位作为空闲槽位挂到主桶 LRU 端，转而使用已有的槽位。
    fn steal(&self, home: usize, key: BlockKey) -> SlotId {
        for victim_bucket in (0..self.shards.len()).filter(|&i| i != home) {
            let taken = self.shards[victim_bucket].lock().take_free();
            let Some((id, _old)) = taken else {
                continue;
            };
            log::debug!("[BCACHE] bget {} took slot={} from bucket {}", key, id, victim_bucket);
            return self.adopt_stolen(home, id, key);
        }

        log::error!("[BCACHE] bget {}: all {} buffers are referenced", key, self.pool.len());
        panic!("bget: no buffers");
    }

    /// 窃取的第二步：锁住主桶，把已摘下的槽位挂进来
    ///
    /// 调用时 `id` 不在任何桶中。如果主桶里已经有 `key`，`id` 以空闲状态挂到 LRU 端，
    /// 返回已有的槽位；否则 `id` 分配给 `key` 并挂到 MRU 端。
    fn adopt_stolen(&self, home: usize, id: SlotId, key: BlockKey) -> SlotId {
        let slot = self.pool.slot(id);
        let mut shard = self.shards[home].lock();
        slot.set_shard(home);
        slot.set_valid(false);

        if let Some(existing) = shard.find(key) {
            shard.link_lru(id, SlotMeta::free());
            shard.get_ref(existing);
            StatCounters::bump(&self.stats.steal_races);
            log::debug!(
                "[BCACHE] bget {} raced, returning stolen slot={} as free, using slot={}",
                key,
                id,
                existing
            );
            return existing;
        }

        shard.link_mru(id, SlotMeta::assigned(key));
        StatCounters::bump(&self.stats.steals);
        log::debug!("[BCACHE] bget {} stole slot={} into bucket {}", key, id, home);
        id
    }

    /// 在槽位当前所在的桶锁下执行 `f`
    ///
    /// 先查槽位记录的桶编号，找不到再遍历所有桶；都找不到属于一致性错误
    fn with_slot_meta<T>(
        &self,
        id: SlotId,
        op: &'static str,
        f: impl FnOnce(&mut Shard, SlotId) -> T,
    ) -> T {
        let recorded = self.pool.slot(id).shard();
        if let Some(shard) = self.shards.get(recorded) {
            let mut shard = shard.lock();
            if shard.contains(id) {
                return f(&mut shard, id);
            }
        }

        for (i, shard) in self.shards.iter().enumerate() {
            if i == recorded {
                continue;
            }
            let mut shard = shard.lock();
            if shard.contains(id) {
                log::warn!("[BCACHE] {}: slot={} found in bucket {}, recorded {}", op, id, i, recorded);
                self.pool.slot(id).set_shard(i);
                return f(&mut shard, id);
            }
        }

        log::error!("[BCACHE] {}: slot={} not found in any bucket", op, id);
        panic!("{}: buffer not found in any bucket", op);
    }

    /// 减少引用计数，归零时移到所在桶的 MRU 端
    ///
    /// 调用前内容锁必须已经释放
    pub(crate) fn release_slot(&self, id: SlotId, key: BlockKey) {
        self.with_slot_meta(id, "brelse", |shard, id| {
            let remaining = match shard.meta_mut(id).and_then(SlotMeta::put) {
                Some(remaining) => remaining,
                None => {
                    log::error!("[BCACHE] brelse {}: slot={} reference count underflow", key, id);
                    panic!("brelse: reference count underflow");
                }
            };
            if remaining == 0 {
                shard.touch(id);
            }
            log::trace!("[BCACHE] brelse {} slot={} refcnt={}", key, id, remaining);
        });
    }

    pub(crate) fn pin_slot(&self, id: SlotId) {
        self.with_slot_meta(id, "bpin", |shard, id| {
            shard.get_ref(id);
        });
    }

    pub(crate) fn unpin_slot(&self, id: SlotId) {
        self.with_slot_meta(id, "bunpin", |shard, id| {
            if shard.meta_mut(id).and_then(SlotMeta::put).is_none() {
                log::error!("[BCACHE] bunpin: slot={} reference count underflow", id);
                panic!("bunpin: reference count underflow");
            }
        });
    }

    pub(crate) fn pool(&self) -> &BufferPool<R> {
        &self.pool
    }

    pub(crate) fn bdev(&self) -> &BlockDev<D> {
        &self.bdev
    }

    pub(crate) fn count_load(&self) {
        StatCounters::bump(&self.stats.loads);
    }

    pub(crate) fn count_write(&self) {
        StatCounters::bump(&self.stats.writes);
    }

    // ===== 查询接口 =====

    /// 缓存块数量
    pub fn capacity(&self) -> usize {
        self.pool.len()
    }

    /// 桶数量
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// 块大小
    pub fn block_size(&self) -> usize {
        self.pool.block_size()
    }

    /// 底层设备
    pub fn device(&self) -> &D {
        self.bdev.device()
    }

    /// 物理读取次数
    pub fn physical_read_count(&self) -> u64 {
        self.bdev.physical_read_count()
    }

    /// 物理写入次数
    pub fn physical_write_count(&self) -> u64 {
        self.bdev.physical_write_count()
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// 指定桶当前拥有的槽位数量
    pub fn shard_len(&self, bucket: usize) -> usize {
        self.shards[bucket].lock().len()
    }

    /// 指定桶中从 MRU 到 LRU 的缓存键（跳过未分配的槽位）
    pub fn shard_keys(&self, bucket: usize) -> Vec<BlockKey> {
        self.shards[bucket]
            .lock()
            .snapshot()
            .into_iter()
            .filter_map(|(_, meta)| meta.key)
            .collect()
    }

    /// 块是否在缓存中（不改变 LRU 顺序）
    pub fn is_cached(&self, dev: u32, blockno: u32) -> bool {
        self.resident_count(dev, blockno) > 0
    }

    /// 持有该身份的槽位数量，正常情况下不超过 1
    pub fn resident_count(&self, dev: u32, blockno: u32) -> usize {
        let key = BlockKey::new(dev, blockno);
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .lock()
                    .snapshot()
                    .iter()
                    .filter(|(_, meta)| meta.matches(key))
                    .count()
            })
            .sum()
    }

    /// 块的引用计数，不在缓存中返回 `None`
    pub fn ref_count(&self, dev: u32, blockno: u32) -> Option<u32> {
        let key = BlockKey::new(dev, blockno);
        self.shards.iter().find_map(|shard| {
            let shard = shard.lock();
            shard.find(key).and_then(|id| shard.meta(id)).map(|meta| meta.refcnt)
        })
    }
}

impl<D: BlockDevice, R: RawMutex> core::fmt::Debug for BufferCache<D, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufferCache")
            .field("buffers", &self.pool.len())
            .field("buckets", &self.shards.len())
            .field("bdev", &self.bdev)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}
