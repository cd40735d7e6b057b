//! 块设备核心类型

use crate::error::{Error, ErrorKind, Result};
use crate::types::BlockKey;
use core::sync::atomic::{AtomicU64, Ordering};

/// 块设备接口
///
/// 实现此 trait 以提供底层块设备访问（磁盘驱动、virtio、镜像文件等）。
///
/// 所有方法都是同步的，且只接受 `&self`：缓存会在多个线程中并发调用，
/// 设备实现需要自行保证内部同步。每次读写恰好一个完整块，没有部分结果。
///
/// # 示例
///
/// ```rust,ignore
/// use bcache_core::{BlockDevice, Result};
///
/// struct VirtioDisk {
///     // ...
/// }
///
/// impl BlockDevice for VirtioDisk {
///     fn block_size(&self) -> usize {
///         1024
///     }
///
///     fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()> {
///         // 发起磁盘读并等待完成
///         Ok(())
///     }
///
///     fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()> {
///         // 发起磁盘写并等待完成
///         Ok(())
///     }
/// }
/// ```
pub trait BlockDevice: Send + Sync {
    /// 块大小（字节）
    fn block_size(&self) -> usize;

    /// 读取一个完整块
    ///
    /// # 参数
    ///
    /// * `dev` - 设备号
    /// * `blockno` - 块号
    /// * `buf` - 目标缓冲区（长度等于 `block_size()`）
    fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()>;

    /// 写入一个完整块
    ///
    /// # 参数
    ///
    /// * `dev` - 设备号
    /// * `blockno` - 块号
    /// * `buf` - 源缓冲区（长度等于 `block_size()`）
    fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()>;

    /// 刷新设备缓存
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// 块设备包装器
///
/// 在底层设备之外记录物理读写次数，并检查缓冲区长度。
/// 计数器为原子变量，可以在多个线程间共享。
pub struct BlockDev<D> {
    /// 底层设备
    device: D,
    /// 块大小（字节），创建时固定
    block_size: usize,
    /// 物理读取次数（实际设备操作）
    physical_read_count: AtomicU64,
    /// 物理写入次数（实际设备操作）
    physical_write_count: AtomicU64,
}

impl<D: BlockDevice> BlockDev<D> {
    /// 创建新的块设备包装器
    ///
    /// 块大小为 0 或超过 [`MAX_BLOCK_SIZE`](crate::consts::MAX_BLOCK_SIZE) 时返回 `InvalidInput`
    pub fn new(device: D) -> Result<Self> {
        let block_size = device.block_size();
        if block_size == 0 || block_size > crate::consts::MAX_BLOCK_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Block size must be between 1 and MAX_BLOCK_SIZE bytes",
            ));
        }

        Ok(Self {
            device,
            block_size,
            physical_read_count: AtomicU64::new(0),
            physical_write_count: AtomicU64::new(0),
        })
    }

    /// 获取底层设备的引用
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 获取块大小
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// 获取物理读取次数
    pub fn physical_read_count(&self) -> u64 {
        self.physical_read_count.load(Ordering::Relaxed)
    }

    /// 获取物理写入次数
    pub fn physical_write_count(&self) -> u64 {
        self.physical_write_count.load(Ordering::Relaxed)
    }

    /// 从设备读取一个块
    pub fn read_block(&self, key: BlockKey, buf: &mut [u8]) -> Result<()> {
        self.check_len(buf.len())?;
        self.physical_read_count.fetch_add(1, Ordering::Relaxed);
        self.device.read_block(key.dev, key.blockno, buf)
    }

    /// 向设备写入一个块
    pub fn write_block(&self, key: BlockKey, buf: &[u8]) -> Result<()> {
        self.check_len(buf.len())?;
        self.physical_write_count.fetch_add(1, Ordering::Relaxed);
        self.device.write_block(key.dev, key.blockno, buf)
    }

    /// 刷新设备
    pub fn flush(&self) -> Result<()> {
        self.device.flush()
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Buffer length does not match block size",
            ));
        }
        Ok(())
    }
}

impl<D> core::fmt::Debug for BlockDev<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockDev")
            .field("block_size", &self.block_size)
            .field("physical_reads", &self.physical_read_count.load(Ordering::Relaxed))
            .field("physical_writes", &self.physical_write_count.load(Ordering::Relaxed))
            .finish()
    }
}
