//! 桶（shard）
//!
//! 每个桶拥有一条独立的 LRU 链表，链表节点以槽位编号为键、[`SlotMeta`] 为值。
//! 使用 `lru::LruCache`（无容量上限）作为双向链表：
//!
//! | 操作              | 实现                         |
//! |-------------------|------------------------------|
//! | 摘除节点          | `pop(&id)`，O(1)             |
//! | 插到 MRU 端       | `put(id, meta)`，O(1)        |
//! | 移到 MRU 端       | `promote(&id)`，O(1)         |
//! | 移到 LRU 端       | `demote(&id)`，O(1)          |
//! | 从 MRU 端遍历     | `iter()`                     |
//! | 从 LRU 端遍历     | `iter().rev()`               |
//!
//! 桶本身不加锁，由 [`BufferCache`](super::BufferCache) 用自旋锁包裹。
//! 所有读取链表查找元数据的操作都使用 `peek` 类接口，不会改变链表顺序。

use super::buffer::SlotMeta;
use crate::types::{BlockKey, SlotId};
use alloc::vec::Vec;
use lru::LruCache;

/// 一个桶的 LRU 链表
pub(crate) struct Shard {
    list: LruCache<SlotId, SlotMeta>,
}

impl Shard {
    /// 创建空桶
    pub fn new() -> Self {
        Self {
            list: LruCache::unbounded(),
        }
    }

    /// 桶内槽位数量
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// 槽位是否在本桶中
    pub fn contains(&self, id: SlotId) -> bool {
        self.list.contains(&id)
    }

    /// 查找身份匹配的槽位
    pub fn find(&self, key: BlockKey) -> Option<SlotId> {
        self.list
            .iter()
            .find(|(_, meta)| meta.matches(key))
            .map(|(&id, _)| id)
    }

    /// 从 LRU 端开始查找引用计数为 0 的槽位
    pub fn find_free(&self) -> Option<SlotId> {
        self.list
            .iter()
            .rev()
            .find(|(_, meta)| meta.is_free())
            .map(|(&id, _)| id)
    }

    /// 获取槽位元数据（不改变链表顺序）
    pub fn meta_mut(&mut self, id: SlotId) -> Option<&mut SlotMeta> {
        self.list.peek_mut(&id)
    }

    /// 获取槽位元数据（不改变链表顺序）
    pub fn meta(&self, id: SlotId) -> Option<&SlotMeta> {
        self.list.peek(&id)
    }

    /// 命中：增加引用计数
    ///
    /// 槽位不在本桶返回 `false`
    pub fn get_ref(&mut self, id: SlotId) -> bool {
        match self.list.peek_mut(&id) {
            Some(meta) => {
                meta.get();
                true
            }
            None => false,
        }
    }

    /// 把空闲槽位原地分配给 `key`，不移动其在链表中的位置
    pub fn assign(&mut self, id: SlotId, key: BlockKey) {
        if let Some(meta) = self.list.peek_mut(&id) {
            debug_assert!(meta.is_free(), "assigning a referenced slot");
            *meta = SlotMeta::assigned(key);
        }
    }

    /// 从 LRU 端摘除第一个空闲槽位
    pub fn take_free(&mut self) -> Option<(SlotId, SlotMeta)> {
        let id = self.find_free()?;
        self.list.pop(&id).map(|meta| (id, meta))
    }

    /// 插入到 MRU 端
    pub fn link_mru(&mut self, id: SlotId, meta: SlotMeta) {
        self.list.put(id, meta);
    }

    /// 插入到 LRU 端
    pub fn link_lru(&mut self, id: SlotId, meta: SlotMeta) {
        self.list.put(id, meta);
        self.list.demote(&id);
    }

    /// 移到 MRU 端
    pub fn touch(&mut self, id: SlotId) {
        self.list.promote(&id);
    }

    /// 从 MRU 到 LRU 列出桶内槽位
    pub fn snapshot(&self) -> Vec<(SlotId, SlotMeta)> {
        self.list.iter().map(|(&id, &meta)| (id, meta)).collect()
    }
}
