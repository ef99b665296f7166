//! 关中断自旋锁
//!
//! 在 [`RawSpin`] 之上叠加 [`IntrGuard`]：获取锁前先关闭本地中断，
//! 释放锁后恢复。只适用于很短的临界区，持有期间禁止进行任何阻塞操作。

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

use lock_api::RawMutex;

use crate::intr_guard::IntrGuard;
use crate::spin_mutex::RawSpin;

/// 提供对数据的互斥访问的自旋锁结构体。
///
/// # 示例
/// ```ignore
/// let lock = SpinLock::new(0);
/// {
///     let mut guard = lock.lock(); // 获取锁，禁用中断
///     *guard += 1;
/// } // 离开作用域，自动释放锁并恢复中断状态
/// ```
///
/// # 注意
/// SpinLock 不可重入，同一线程嵌套获取会死锁。
pub struct SpinLock<T> {
    raw: RawSpin,
    data: UnsafeCell<T>,
}

impl<T> SpinLock<T> {
    /// 创建一个新的 SpinLock 实例。
    pub const fn new(data: T) -> Self {
        SpinLock {
            raw: RawSpin::INIT,
            data: UnsafeCell::new(data),
        }
    }

    /// 获取自旋锁，返回 RAII 保护器。
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let intr_guard = IntrGuard::new();
        self.raw.lock();
        SpinLockGuard {
            lock: self,
            _intr_guard: intr_guard,
        }
    }

    /// 尝试获取自旋锁，失败时立即恢复中断状态并返回 None。
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        let intr_guard = IntrGuard::new();
        if self.raw.try_lock() {
            Some(SpinLockGuard {
                lock: self,
                _intr_guard: intr_guard,
            })
        } else {
            None
        }
    }

    /// 锁当前是否被占用
    ///
    /// 只用于断言与调试，返回值在多核下随时可能过期。
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// 取出内部数据
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> core::fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpinLock")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// SpinLock 的 RAII 保护器。
///
/// 字段顺序保证先释放锁标志，再由 IntrGuard 恢复中断。
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    _intr_guard: IntrGuard,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: 持有锁期间独占访问
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: 持有锁期间独占访问
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: 保护器存在即代表当前上下文持有锁
        unsafe { self.lock.raw.unlock() };
    }
}

// Safety: 通过 RawSpin 保证了对数据的互斥访问。
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}
