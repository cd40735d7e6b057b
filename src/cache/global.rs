//! 进程级块缓存单例
//!
//! 块缓存在启动阶段构造一次，之后贯穿整个运行期，不会销毁。

use super::block_cache::BufferCache;
use super::DefaultSleepLock;
use crate::block::BlockDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::types::CacheConfig;
use lock_api::RawMutex;
use spin::Once;

/// 全局块缓存
///
/// 必须在任何使用者线程启动前调用 [`GlobalCache::init`]。
///
/// # 示例
///
/// ```rust,ignore
/// static BCACHE: GlobalCache<VirtioDisk> = GlobalCache::new();
///
/// fn kernel_main() {
///     BCACHE.init(CacheConfig::default(), VirtioDisk::new()).expect("binit");
///     // ... 启动其他线程 ...
/// }
///
/// fn fs_code() -> Result<()> {
///     let buf = BCACHE.get().read(ROOTDEV, 1)?;
///     // ...
/// }
/// ```
pub struct GlobalCache<D, R = DefaultSleepLock> {
    cell: Once<BufferCache<D, R>>,
}

impl<D: BlockDevice, R: RawMutex> GlobalCache<D, R> {
    /// 创建未初始化的单例，可用于 `static`
    pub const fn new() -> Self {
        Self { cell: Once::new() }
    }

    /// 初始化单例
    ///
    /// 重复初始化返回 `AlreadyExists`，已有的缓存保持不变
    pub fn init(&self, config: CacheConfig, device: D) -> Result<&BufferCache<D, R>> {
        let cache = BufferCache::new(config, device)?;
        let mut fresh = false;
        let cache = self.cell.call_once(|| {
            fresh = true;
            cache
        });
        if !fresh {
            log::warn!("[BCACHE] global cache initialized twice");
            return Err(Error::new(ErrorKind::AlreadyExists, "Buffer cache already initialized"));
        }
        Ok(cache)
    }

    /// 获取已初始化的缓存
    ///
    /// # Panics
    ///
    /// 未初始化时 panic
    pub fn get(&self) -> &BufferCache<D, R> {
        match self.cell.get() {
            Some(cache) => cache,
            None => {
                log::error!("[BCACHE] global cache used before init");
                panic!("bcache: used before init");
            }
        }
    }

    /// 获取缓存，未初始化时返回 `None`
    pub fn try_get(&self) -> Option<&BufferCache<D, R>> {
        self.cell.get()
    }

    /// 是否已初始化
    pub fn is_initialized(&self) -> bool {
        self.cell.is_completed()
    }
}

impl<D: BlockDevice, R: RawMutex> Default for GlobalCache<D, R> {
    fn default() -> Self {
        Self::new()
    }
}
