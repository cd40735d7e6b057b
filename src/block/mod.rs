//! 块设备抽象
//!
//! block/device.rs 提供块设备接口 `BlockDevice`，以及统计物理读写次数的包装器 `BlockDev`。
//! 缓存层只通过 `BlockDev` 访问设备，每次读写一个完整块。
//!
//! block/memory.rs 提供内存块设备，用于测试和宿主机工具。

mod device;
mod memory;

pub use device::{BlockDevice, BlockDev};
pub use memory::MemDevice;
