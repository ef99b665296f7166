//! 中断保护器
//!
//! 创建时关闭本地中断，销毁时恢复之前的状态。
//!
//! 关中断只能阻止本地 CPU 上“任务 vs 中断处理”的并发，
//! 多核共享数据仍需配合自旋锁。

use crate::arch_ops;

/// 中断保护器
///
/// # 示例
/// ```ignore
/// {
///     let _guard = IntrGuard::new(); // 禁用中断
///     // 临界区代码
/// } // 自动恢复
/// ```
pub struct IntrGuard {
    flags: usize,
}

impl IntrGuard {
    /// 关闭中断并记录之前的状态
    pub fn new() -> Self {
        // SAFETY: 保存的 flags 只会在 drop 时原样恢复
        let flags = unsafe { arch_ops().read_and_disable_interrupts() };
        IntrGuard { flags }
    }

    /// 进入临界区前中断是否处于开启状态
    pub fn was_enabled(&self) -> bool {
        self.flags & arch_ops().sstatus_sie() != 0
    }
}

impl Default for IntrGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IntrGuard {
    fn drop(&mut self) {
        // SAFETY: flags 来自 new() 中的 read_and_disable_interrupts
        unsafe { arch_ops().restore_interrupts(self.flags) };
    }
}
