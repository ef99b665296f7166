//! 用户帧表
//!
//! 跟踪每个装有用户页的物理帧：所属进程、用户页地址和钉住计数。
//! 帧数达到上限（或物理页分配器耗尽）后，新的分配通过二次机会置换腾出帧。
//!
//! # 换出流程
//!
//! 1. 持帧表锁选中牺牲帧，标记为 `Evicting`，释放帧表锁
//! 2. 持牺牲页所属进程的补充页表锁：读 dirty 位、清除映射、写入交换区、
//!    把表项改为 `Swapped`。写入失败时恢复映射
//! 3. 再次持帧表锁，腾空的帧交给请求者；失败则恢复为驻留
//!
//! 帧表锁在任何设备 I/O 期间都不持有。

mod pool;

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem::ManuallyDrop;
use core::sync::atomic::{AtomicUsize, Ordering};

use sync::SpinLock;

use crate::address::{Paddr, Vaddr};
use crate::error::{VmError, VmResult};
use crate::phys::{PhysPageAllocator, frame_bytes};
use crate::process::{Pid, ProcessVm};
use crate::swap::SwapManager;

use pool::{Frame, FramePool, Slot};

/// 帧表统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// 帧上限
    pub capacity: usize,
    /// 驻留帧数（含正在换出的帧）
    pub resident: usize,
    /// 被钉住的帧数
    pub pinned: usize,
    /// 累计换出次数
    pub evictions: usize,
}

/// 用户帧表
pub struct FrameTable {
    pool: SpinLock<FramePool>,
    phys: Arc<dyn PhysPageAllocator>,
    swap: Arc<SwapManager>,
    evictions: AtomicUsize,
}

impl FrameTable {
    /// 创建最多跟踪 `capacity` 个帧的帧表
    pub fn new(
        capacity: usize,
        phys: Arc<dyn PhysPageAllocator>,
        swap: Arc<SwapManager>,
    ) -> Self {
        Self {
            pool: SpinLock::new(FramePool::new(capacity)),
            phys,
            swap,
            evictions: AtomicUsize::new(0),
        }
    }

    /// 为 `owner` 的 `upage` 分配一个帧
    ///
    /// 返回的帧处于钉住状态，内容未定义；在 [`PinGuard`] 释放之前不会被置换。
    /// 所有帧都被钉住时返回 [`VmError::OutOfFrames`]，
    /// 牺牲页无法写入交换区时返回对应的交换区错误。
    pub fn allocate(&self, owner: &Arc<ProcessVm>, upage: Vaddr) -> VmResult<PinGuard<'_>> {
        if let Some(guard) = self.allocate_fresh(owner, upage) {
            return Ok(guard);
        }
        let (idx, paddr) = self.evict_slot()?;
        self.pool.lock().install(
            idx,
            Frame {
                paddr,
                upage,
                owner: owner.clone(),
                pin_count: 1,
            },
        );
        log::trace!("frame: reuse {:?} for pid {} {:?}", paddr, owner.pid(), upage);
        Ok(PinGuard { table: self, paddr })
    }

    fn allocate_fresh(&self, owner: &Arc<ProcessVm>, upage: Vaddr) -> Option<PinGuard<'_>> {
        let mut pool = self.pool.lock();
        let idx = pool.free_slot()?;
        let paddr = self.phys.get_user_page()?;
        pool.install(
            idx,
            Frame {
                paddr,
                upage,
                owner: owner.clone(),
                pin_count: 1,
            },
        );
        log::trace!("frame: new {:?} for pid {} {:?}", paddr, owner.pid(), upage);
        Some(PinGuard { table: self, paddr })
    }

    /// 换出一个牺牲帧，返回腾空的物理帧
    ///
    /// 帧从帧表中移除，调用者获得其所有权，负责装入新内容或归还分配器。
    pub fn evict(&self) -> VmResult<Paddr> {
        let (idx, paddr) = self.evict_slot()?;
        self.pool.lock().take(idx);
        Ok(paddr)
    }

    /// 选中并换出牺牲帧，成功时该槽处于 `Reserved` 状态
    fn evict_slot(&self) -> VmResult<(usize, Paddr)> {
        let (idx, paddr, upage, owner) = {
            let mut pool = self.pool.lock();
            let Some(idx) = pool.select_victim() else {
                log::warn!("frame: all {} frames pinned", pool.capacity());
                return Err(VmError::OutOfFrames);
            };
            let (paddr, upage, owner) = pool.begin_eviction(idx);
            (idx, paddr, upage, owner)
        };

        let result = self.swap_out(&owner, upage, paddr);

        let released = {
            let mut pool = self.pool.lock();
            match result {
                Ok(()) => pool.finish_eviction(idx),
                Err(_) => {
                    pool.abort_eviction(idx);
                    None
                }
            }
        };
        // 进程引用可能是最后一个，在锁外释放
        drop(released);
        result?;
        self.evictions.fetch_add(1, Ordering::Relaxed);
        log::debug!("frame: evicted pid {} {:?} from {:?}", owner.pid(), upage, paddr);
        Ok((idx, paddr))
    }

    /// 保存牺牲页的内容并解除其映射
    fn swap_out(&self, owner: &ProcessVm, upage: Vaddr, paddr: Paddr) -> VmResult<()> {
        let mut spt = owner.spt().lock();
        let pt = owner.page_table();
        let Some(entry) = spt.lookup_mut(upage) else {
            // 所属进程正在退出，表项已被取走，内容不再需要
            log::warn!("frame: victim {:?} of pid {} has no page entry", upage, owner.pid());
            pt.clear_mapping(upage);
            return Ok(());
        };
        let dirty = pt.is_dirty(upage);
        pt.clear_mapping(upage);
        // SAFETY: 映射已清除且帧处于 Evicting 状态，没有其它访问者
        let bytes = unsafe { frame_bytes(self.phys.as_ref(), paddr) };
        match self.swap.write_out(bytes) {
            Ok(slot) => {
                entry.mark_swapped(slot, dirty);
                Ok(())
            }
            Err(e) => {
                if !pt.set_mapping(upage, paddr, entry.writable()) {
                    log::error!("frame: failed to restore mapping of {:?}", upage);
                }
                pt.set_dirty(upage, dirty);
                log::warn!("frame: cannot evict {:?}: {}", upage, e);
                Err(e)
            }
        }
    }

    /// 归还帧
    ///
    /// 调用者负责先解除映射。
    pub fn free(&self, paddr: Paddr) -> VmResult<()> {
        let frame = {
            let mut pool = self.pool.lock();
            let idx = pool.slot_of(paddr).ok_or(VmError::FrameNotTracked)?;
            if !matches!(pool.slot_mut(idx), Slot::Resident(_)) {
                return Err(VmError::FrameNotTracked);
            }
            pool.take(idx)
        };
        self.phys.free_user_page(paddr);
        drop(frame);
        Ok(())
    }

    /// 钉住帧，使其不会被选为牺牲页
    ///
    /// 帧正在换出时返回 `Ok(None)`，调用者应在不持有任何锁的情况下重试。
    pub fn pin(&self, paddr: Paddr) -> VmResult<Option<PinGuard<'_>>> {
        let mut pool = self.pool.lock();
        let idx = pool.slot_of(paddr).ok_or(VmError::FrameNotTracked)?;
        match pool.slot_mut(idx) {
            Slot::Resident(frame) => {
                frame.pin_count += 1;
                Ok(Some(PinGuard { table: self, paddr }))
            }
            _ => Ok(None),
        }
    }

    fn unpin(&self, paddr: Paddr) {
        let mut pool = self.pool.lock();
        if let Some(idx) = pool.slot_of(paddr) {
            if let Slot::Resident(frame) = pool.slot_mut(idx) {
                if frame.pin_count > 0 {
                    frame.pin_count -= 1;
                    return;
                }
            }
        }
        log::warn!("frame: unpin of unpinned frame {:?}", paddr);
    }

    /// 归还某进程的全部驻留帧并清除映射，返回归还的帧数
    ///
    /// 正在换出的帧由换出者处理；被钉住的帧不会归还。
    pub fn release_owner(&self, pid: Pid) -> usize {
        let released: Vec<Slot> = {
            let mut pool = self.pool.lock();
            let victims: Vec<usize> = pool
                .slots()
                .enumerate()
                .filter_map(|(idx, slot)| match slot {
                    Slot::Resident(f) if f.owner.pid() == pid => {
                        if f.pin_count > 0 {
                            log::warn!("frame: pid {} exits with pinned {:?}", pid, f.upage);
                            None
                        } else {
                            Some(idx)
                        }
                    }
                    _ => None,
                })
                .collect();
            victims.into_iter().map(|idx| pool.take(idx)).collect()
        };
        for slot in &released {
            if let Slot::Resident(frame) = slot {
                frame.owner.page_table().clear_mapping(frame.upage);
                self.phys.free_user_page(frame.paddr);
            }
        }
        released.len()
    }

    /// 统计信息
    pub fn stats(&self) -> FrameStats {
        let pool = self.pool.lock();
        let mut resident = 0;
        let mut pinned = 0;
        for slot in pool.slots() {
            if let Slot::Resident(f) | Slot::Evicting(f) = slot {
                resident += 1;
                if f.pin_count > 0 {
                    pinned += 1;
                }
            }
        }
        FrameStats {
            capacity: pool.capacity(),
            resident,
            pinned,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// 所有驻留帧的 (进程, 用户页, 物理帧)，按槽顺序
    pub fn resident_pages(&self) -> Vec<(Pid, Vaddr, Paddr)> {
        self.pool
            .lock()
            .slots()
            .filter_map(|slot| match slot {
                Slot::Resident(f) => Some((f.owner.pid(), f.upage, f.paddr)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn phys(&self) -> &dyn PhysPageAllocator {
        self.phys.as_ref()
    }
}

/// 帧钉住保护器
///
/// 存活期间帧不会被置换，释放时自动解除钉住。
#[must_use]
pub struct PinGuard<'a> {
    table: &'a FrameTable,
    paddr: Paddr,
}

impl PinGuard<'_> {
    /// 被钉住的物理帧
    pub fn paddr(&self) -> Paddr {
        self.paddr
    }

    /// 以字节切片访问帧内容
    ///
    /// # Safety
    /// 调用者必须保证没有其它切片同时指向该帧。
    pub(crate) unsafe fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: 帧已被钉住，唯一性由调用者保证
        unsafe { frame_bytes(self.table.phys(), self.paddr) }
    }

    /// 连同钉住一起归还帧
    pub(crate) fn free(self) -> VmResult<()> {
        let this = ManuallyDrop::new(self);
        this.table.free(this.paddr)
    }
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        self.table.unpin(self.paddr);
    }
}
