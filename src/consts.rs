//! 块缓存常量定义

//=============================================================================
// 缓存规模
//=============================================================================

/// 默认缓存块数量
pub const DEFAULT_NBUF: usize = 30;

/// 默认桶数量
///
/// 取素数，使连续块号均匀分布到各个桶
pub const DEFAULT_NBUCKET: usize = 13;

//=============================================================================
// 块大小
//=============================================================================

/// 默认块大小（1024 字节）
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// 最大块大小（65536 字节）
pub const MAX_BLOCK_SIZE: usize = 65536;

//=============================================================================
// 日志事务
//=============================================================================

/// 单个日志事务最多记录的块数
pub const DEFAULT_LOG_BLOCKS: usize = 10;
