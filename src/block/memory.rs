//! 内存块设备
//!
//! 用于测试和宿主机工具，块内容保存在内存中，首次访问时为全零。

use super::BlockDevice;
use crate::consts::DEFAULT_BLOCK_SIZE;
use crate::error::{Error, ErrorKind, Result};
use crate::types::BlockKey;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

/// 内存块设备
///
/// 每个设备号拥有 `nblocks` 个块，块号越界返回 `InvalidInput`。
/// 可以通过 [`MemDevice::set_fail_reads`] / [`MemDevice::set_fail_writes`] 注入 I/O 错误。
pub struct MemDevice {
    block_size: usize,
    nblocks: u32,
    blocks: Mutex<BTreeMap<BlockKey, Vec<u8>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemDevice {
    /// 创建内存设备
    pub fn new(block_size: usize, nblocks: u32) -> Self {
        Self {
            block_size,
            nblocks,
            blocks: Mutex::new(BTreeMap::new()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// 使用默认块大小（1024 字节）创建内存设备
    pub fn with_default_block_size(nblocks: u32) -> Self {
        Self::new(DEFAULT_BLOCK_SIZE, nblocks)
    }

    /// 读取后续操作是否失败
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// 写入后续操作是否失败
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 直接查看设备上的块内容（不经过缓存）
    ///
    /// 从未写入过的块返回 `None`
    pub fn peek(&self, dev: u32, blockno: u32) -> Option<Vec<u8>> {
        self.blocks.lock().get(&BlockKey::new(dev, blockno)).cloned()
    }

    /// 直接修改设备上的块内容（不经过缓存）
    pub fn poke(&self, dev: u32, blockno: u32, data: &[u8]) -> Result<()> {
        self.check(blockno, data.len())?;
        self.blocks.lock().insert(BlockKey::new(dev, blockno), data.to_vec());
        Ok(())
    }

    fn check(&self, blockno: u32, len: usize) -> Result<()> {
        if blockno >= self.nblocks {
            return Err(Error::new(ErrorKind::InvalidInput, "Block number out of range"));
        }
        if len != self.block_size {
            return Err(Error::new(ErrorKind::InvalidInput, "Buffer length does not match block size"));
        }
        Ok(())
    }
}

impl BlockDevice for MemDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()> {
        self.check(blockno, buf.len())?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Io, "Injected read failure"));
        }
        match self.blocks.lock().get(&BlockKey::new(dev, blockno)) {
            Some(data) => buf.copy_from_slice(data),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()> {
        self.check(blockno, buf.len())?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Io, "Injected write failure"));
        }
        self.blocks.lock().insert(BlockKey::new(dev, blockno), buf.to_vec());
        Ok(())
    }
}
