//! 块缓存公共数据结构定义

use crate::consts::{DEFAULT_NBUCKET, DEFAULT_NBUF};
use crate::error::{Error, ErrorKind, Result};
use core::fmt;

/// 缓存块槽位编号（缓冲池数组下标）
pub type SlotId = usize;

/// 缓存键：(设备号, 块号)
///
/// 两个字段同时相等才视为同一个块
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey {
    /// 设备号
    pub dev: u32,
    /// 块号
    pub blockno: u32,
}

impl BlockKey {
    /// 创建缓存键
    pub const fn new(dev: u32, blockno: u32) -> Self {
        Self { dev, blockno }
    }

    /// 该块的主桶编号（`blockno % shard_count`）
    ///
    /// 只由块号决定，与设备号无关
    pub const fn home(&self, shard_count: usize) -> usize {
        self.blockno as usize % shard_count
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dev, self.blockno)
    }
}

/// 块缓存配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// 缓存块数量
    pub nbuf: usize,
    /// 桶数量
    pub nbucket: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            nbuf: DEFAULT_NBUF,
            nbucket: DEFAULT_NBUCKET,
        }
    }
}

impl CacheConfig {
    /// 创建配置
    pub const fn new(nbuf: usize, nbucket: usize) -> Self {
        Self { nbuf, nbucket }
    }

    /// 校验配置
    ///
    /// 缓存块数量和桶数量都必须大于 0
    pub fn validate(&self) -> Result<()> {
        if self.nbuf == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "Cache must hold at least one buffer"));
        }
        if self.nbucket == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "Cache must have at least one bucket"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_home_bucket() {
        assert_eq!(BlockKey::new(1, 27).home(13), 1);
        assert_eq!(BlockKey::new(2, 27).home(13), 1);
        assert_eq!(BlockKey::new(1, 5).home(1), 0);
    }

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.nbuf, 30);
        assert_eq!(config.nbucket, 13);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let err = CacheConfig::new(0, 13).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = CacheConfig::new(8, 0).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
