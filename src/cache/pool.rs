//! 缓冲池
//!
//! 固定大小的槽位数组，启动时一次性创建，不参与任何索引逻辑。

use super::buffer::Slot;
use crate::types::SlotId;
use alloc::vec::Vec;
use lock_api::RawMutex;

/// 缓冲池
pub struct BufferPool<R> {
    slots: Vec<Slot<R>>,
    block_size: usize,
}

impl<R: RawMutex> BufferPool<R> {
    /// 创建 `pool_size` 个空槽位
    pub fn new(pool_size: usize, block_size: usize) -> Self {
        let slots = (0..pool_size).map(|id| Slot::new(id, block_size)).collect();
        Self { slots, block_size }
    }

    /// 按编号获取槽位
    ///
    /// 编号只由缓存内部产生，越界属于一致性错误
    pub fn slot(&self, id: SlotId) -> &Slot<R> {
        &self.slots[id]
    }

    /// 槽位数量
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 块大小
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// 遍历所有槽位
    pub fn iter(&self) -> core::slice::Iter<'_, Slot<R>> {
        self.slots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_initialization() {
        let pool = BufferPool::<spin::Mutex<()>>::new(5, 256);
        assert_eq!(pool.len(), 5);
        assert_eq!(pool.block_size(), 256);

        for (i, slot) in pool.iter().enumerate() {
            assert_eq!(slot.id(), i);
            assert!(!slot.is_valid());
            assert!(!slot.is_locked());
        }
    }
}
