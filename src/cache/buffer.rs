//! 缓存块结构
//!
//! 缓存块分成两部分，分别由不同的锁保护：
//!
//! - [`SlotMeta`]：身份（设备号、块号）和引用计数，随槽位一起挂在某个桶的 LRU 链表上，
//!   由该桶的自旋锁保护
//! - [`Slot`]：块数据，由槽位自己的内容锁（睡眠锁）保护，可以在持锁期间进行磁盘 I/O
//!
//! `valid` 和所在桶编号使用原子变量：`valid` 只在引用计数为 0（没有任何内容锁持有者）
//! 时由桶锁下的分配路径清除，其余时间只在内容锁下修改。

use crate::types::{BlockKey, SlotId};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use lock_api::{Mutex, MutexGuard, RawMutex};

/// 链表节点上的元数据，受所在桶的锁保护
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotMeta {
    /// 当前身份，初始化后尚未分配的槽位为 `None`
    pub key: Option<BlockKey>,
    /// 引用计数（持有者 + pin），为 0 时可被驱逐
    pub refcnt: u32,
}

impl SlotMeta {
    /// 空闲槽位：无身份，无引用
    pub const fn free() -> Self {
        Self { key: None, refcnt: 0 }
    }

    /// 刚分配给 `key` 的槽位，调用者持有唯一引用
    pub const fn assigned(key: BlockKey) -> Self {
        Self { key: Some(key), refcnt: 1 }
    }

    /// 是否匹配缓存键
    pub fn matches(&self, key: BlockKey) -> bool {
        self.key == Some(key)
    }

    /// 是否可被驱逐
    pub fn is_free(&self) -> bool {
        self.refcnt == 0
    }

    /// 增加引用计数
    pub fn get(&mut self) {
        self.refcnt += 1;
    }

    /// 减少引用计数，返回减少后的值
    ///
    /// 引用计数已经为 0 时返回 `None`，由调用者按一致性错误处理
    pub fn put(&mut self) -> Option<u32> {
        self.refcnt = self.refcnt.checked_sub(1)?;
        Some(self.refcnt)
    }
}

/// 缓存槽位
///
/// 对应缓冲池数组中的一个元素，启动时创建，之后只会被反复复用。
pub struct Slot<R> {
    /// 槽位编号
    id: SlotId,
    /// 数据是否与磁盘一致
    valid: AtomicBool,
    /// 当前所在桶的编号
    shard: AtomicUsize,
    /// 块数据，内容锁保护
    data: Mutex<R, Vec<u8>>,
}

impl<R: RawMutex> Slot<R> {
    /// 创建空槽位（无效、未加锁、数据全零）
    pub fn new(id: SlotId, block_size: usize) -> Self {
        Self {
            id,
            valid: AtomicBool::new(false),
            shard: AtomicUsize::new(0),
            data: Mutex::new(alloc::vec![0u8; block_size]),
        }
    }

    /// 槽位编号
    pub fn id(&self) -> SlotId {
        self.id
    }

    /// 数据是否有效
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub(crate) fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::Release);
    }

    /// 当前所在桶的编号
    pub fn shard(&self) -> usize {
        self.shard.load(Ordering::Acquire)
    }

    pub(crate) fn set_shard(&self, shard: usize) {
        self.shard.store(shard, Ordering::Release);
    }

    /// 获取内容锁（阻塞）
    pub(crate) fn lock(&self) -> MutexGuard<'_, R, Vec<u8>> {
        self.data.lock()
    }

    /// 内容锁当前是否被持有
    pub fn is_locked(&self) -> bool {
        self.data.is_locked()
    }
}

impl<R: RawMutex> core::fmt::Debug for Slot<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Slot")
            .field("id", &self.id)
            .field("valid", &self.is_valid())
            .field("shard", &self.shard())
            .field("locked", &self.is_locked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestSlot = Slot<spin::Mutex<()>>;

    #[test]
    fn test_slot_creation() {
        let slot = TestSlot::new(3, 512);
        assert_eq!(slot.id(), 3);
        assert!(!slot.is_valid());
        assert!(!slot.is_locked());
        assert_eq!(slot.lock().len(), 512);
    }

    #[test]
    fn test_content_lock() {
        let slot = TestSlot::new(0, 64);
        let mut guard = slot.lock();
        assert!(slot.is_locked());
        guard[0] = 0x42;
        drop(guard);

        assert!(!slot.is_locked());
        assert_eq!(slot.lock()[0], 0x42);
    }

    #[test]
    fn test_meta_reference_counting() {
        let mut meta = SlotMeta::assigned(BlockKey::new(1, 10));
        assert!(meta.matches(BlockKey::new(1, 10)));
        assert!(!meta.matches(BlockKey::new(2, 10)));
        assert!(!meta.is_free());

        meta.get();
        assert_eq!(meta.put(), Some(1));
        assert_eq!(meta.put(), Some(0));
        assert!(meta.is_free());

        // 下溢不会回绕
        assert_eq!(meta.put(), None);
        assert_eq!(meta.refcnt, 0);
    }

    #[test]
    fn test_free_meta_matches_nothing() {
        let meta = SlotMeta::free();
        assert!(meta.is_free());
        assert!(!meta.matches(BlockKey::new(0, 0)));
    }
}
