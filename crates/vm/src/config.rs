//! 虚拟内存子系统的常量与运行时配置

/// 页大小（字节）
pub const PAGE_SIZE: usize = 4096;

/// 交换设备的扇区大小
pub const SECTOR_SIZE: usize = 512;

/// 每个交换槽占用的扇区数
pub const SECTORS_PER_PAGE: usize = PAGE_SIZE / SECTOR_SIZE;

/// 用户地址空间上界（不含）
pub const USER_TOP: usize = 0xC000_0000;

/// 用户栈最大尺寸：8 MiB
pub const MAX_STACK_SIZE: usize = 0x80_0000;

/// 栈指针下方允许访问的字节数
///
/// 覆盖一次性压入 32 字节的指令（如 x86 的 `pusha`）。
pub const STACK_SLACK: usize = 32;

/// 默认的用户帧上限
pub const DEFAULT_FRAME_LIMIT: usize = 1024;

/// 运行时配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// 帧表最多跟踪的用户帧数
    pub frame_limit: usize,
    /// 用户地址空间上界
    pub user_top: usize,
    /// 栈区最大尺寸
    pub max_stack_size: usize,
    /// 栈指针下方的容许访问距离
    pub stack_slack: usize,
}

impl VmConfig {
    /// 使用默认常量构造
    pub const fn new() -> Self {
        Self {
            frame_limit: DEFAULT_FRAME_LIMIT,
            user_top: USER_TOP,
            max_stack_size: MAX_STACK_SIZE,
            stack_slack: STACK_SLACK,
        }
    }

    /// 设置帧上限
    pub const fn with_frame_limit(mut self, frame_limit: usize) -> Self {
        self.frame_limit = frame_limit;
        self
    }

    /// 设置用户地址空间上界
    pub const fn with_user_top(mut self, user_top: usize) -> Self {
        self.user_top = user_top;
        self
    }

    /// 设置栈区最大尺寸
    pub const fn with_max_stack_size(mut self, max_stack_size: usize) -> Self {
        self.max_stack_size = max_stack_size;
        self
    }

    /// 设置栈指针下方的容许距离
    pub const fn with_stack_slack(mut self, stack_slack: usize) -> Self {
        self.stack_slack = stack_slack;
        self
    }

    /// 栈区最低地址
    pub const fn stack_bottom(&self) -> usize {
        self.user_top.saturating_sub(self.max_stack_size)
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self::new()
    }
}
