//! 每进程的虚拟内存状态

use alloc::sync::Arc;

use sync::{SpinLock, SpinMutex};

use crate::address_space::AddressSpace;
use crate::mmap::MmapTable;
use crate::page::SupplementalPageTable;

/// 进程 ID
pub type Pid = usize;

/// 单个用户进程的虚拟内存状态
///
/// 帧表中的每个帧都持有其所属进程的 `Arc<ProcessVm>`，
/// 置换时据此找到牺牲页的页表和补充页表。
pub struct ProcessVm {
    pid: Pid,
    page_table: Arc<dyn AddressSpace>,
    spt: SpinMutex<SupplementalPageTable>,
    mmaps: SpinLock<MmapTable>,
}

impl ProcessVm {
    pub(crate) fn new(pid: Pid, page_table: Arc<dyn AddressSpace>) -> Self {
        Self {
            pid,
            page_table,
            spt: SpinMutex::new(SupplementalPageTable::new()),
            mmaps: SpinLock::new(MmapTable::new()),
        }
    }

    /// 进程 ID
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// 硬件页表
    pub fn page_table(&self) -> &dyn AddressSpace {
        self.page_table.as_ref()
    }

    /// 补充页表
    ///
    /// 锁顺序：可在持有它时获取交换区锁或短暂获取帧表锁，反之不行。
    pub fn spt(&self) -> &SpinMutex<SupplementalPageTable> {
        &self.spt
    }

    pub(crate) fn mmaps(&self) -> &SpinLock<MmapTable> {
        &self.mmaps
    }
}

impl core::fmt::Debug for ProcessVm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProcessVm")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}
