//! 架构相关操作的 Mock 实现
//!
//! 单核、中断状态用一个布尔值表示。关中断次数被计数，
//! 测试可以借此确认自旋锁确实经过了关中断路径。

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Mock 架构操作
pub struct MockArchOps {
    pub interrupt_state: AtomicBool,
    disables: AtomicUsize,
}

impl MockArchOps {
    pub const fn new() -> Self {
        Self {
            interrupt_state: AtomicBool::new(true),
            disables: AtomicUsize::new(0),
        }
    }

    pub unsafe fn read_and_disable_interrupts(&self) -> usize {
        self.disables.fetch_add(1, Ordering::SeqCst);
        self.interrupt_state.swap(false, Ordering::SeqCst) as usize
    }

    pub unsafe fn restore_interrupts(&self, flags: usize) {
        self.interrupt_state.store(flags != 0, Ordering::SeqCst);
    }

    pub fn sstatus_sie(&self) -> usize {
        0x2 // SIE bit
    }

    /// 累计的关中断次数
    pub fn disable_count(&self) -> usize {
        self.disables.load(Ordering::SeqCst)
    }
}

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps::new();
