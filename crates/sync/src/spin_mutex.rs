//! 不关中断的自旋互斥锁
//!
//! 基于 `lock_api` 构建。与 [`crate::SpinLock`] 不同，获取锁时不会禁用本地中断，
//! 因此适合在持有期间进行块设备传输（磁盘读写可能需要中断来完成）。

use core::hint;
use core::sync::atomic::{AtomicBool, Ordering};

use lock_api::{GuardSend, RawMutex};

/// 原始自旋锁，仅包含一个原子标志位
pub struct RawSpin {
    locked: AtomicBool,
}

unsafe impl RawMutex for RawSpin {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: RawSpin = RawSpin {
        locked: AtomicBool::new(false),
    };

    type GuardMarker = GuardSend;

    fn lock(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// 自旋互斥锁
///
/// # 示例
/// ```ignore
/// let m = SpinMutex::new(0);
/// *m.lock() += 1;
/// ```
pub type SpinMutex<T> = lock_api::Mutex<RawSpin, T>;

/// [`SpinMutex`] 的 RAII 保护器
pub type SpinMutexGuard<'a, T> = lock_api::MutexGuard<'a, RawSpin, T>;
