//! 虚拟内存子系统的上下文对象

use alloc::sync::Arc;

use crate::address::{AlignOps, UsizeConvert, Vaddr};
use crate::address_space::AddressSpace;
use crate::config::{PAGE_SIZE, VmConfig};
use crate::error::{VmError, VmResult};
use crate::file::MmFile;
use crate::frame::FrameTable;
use crate::phys::PhysPageAllocator;
use crate::process::{Pid, ProcessVm};
use crate::swap::SwapManager;

/// 虚拟内存管理器
///
/// 持有全局唯一的帧表和交换区，内核在启动时构造一次，
/// 之后所有缺页、映射和进程生命周期操作都经由它完成。
pub struct VmManager {
    config: VmConfig,
    frames: FrameTable,
    swap: Arc<SwapManager>,
}

impl VmManager {
    /// 以给定配置、物理页分配器和交换区构造
    pub fn new(config: VmConfig, phys: Arc<dyn PhysPageAllocator>, swap: SwapManager) -> Self {
        let swap = Arc::new(swap);
        log::info!(
            "vm: {} user frames, {} swap slots",
            config.frame_limit,
            swap.stats().total
        );
        Self {
            frames: FrameTable::new(config.frame_limit, phys, swap.clone()),
            config,
            swap,
        }
    }

    /// 运行时配置
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// 帧表
    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    /// 交换区
    pub fn swap(&self) -> &SwapManager {
        &self.swap
    }

    /// 为新进程建立虚拟内存状态
    pub fn create_process(&self, pid: Pid, page_table: Arc<dyn AddressSpace>) -> Arc<ProcessVm> {
        log::debug!("vm: create pid {}", pid);
        Arc::new(ProcessVm::new(pid, page_table))
    }

    /// 回收进程的全部虚拟内存资源
    ///
    /// 依次解除所有文件映射（写回脏页）、归还驻留帧、释放交换槽、清空补充页表。
    pub fn exit_process(&self, proc: &Arc<ProcessVm>) {
        let ids = proc.mmaps().lock().ids();
        for id in ids {
            if let Err(e) = self.munmap(proc, id) {
                log::warn!("vm: pid {} exit: munmap {} failed: {}", proc.pid(), id, e);
            }
        }

        let frames = self.frames.release_owner(proc.pid());

        let entries = proc.spt().lock().drain();
        let mut slots = 0;
        for slot in entries.iter().filter_map(|e| e.swap_slot()) {
            match self.swap.free(slot) {
                Ok(()) => slots += 1,
                Err(e) => log::warn!("vm: pid {} exit: {:?}: {}", proc.pid(), slot, e),
            }
        }
        log::info!(
            "vm: pid {} exited, released {} frames and {} swap slots",
            proc.pid(),
            frames,
            slots
        );
    }

    /// 为可执行文件的一个段登记惰性装载的页
    ///
    /// 从 `upage` 开始，每页读取文件中最多一页的内容，其余补零；
    /// `read_bytes + zero_bytes` 必须是页大小的整数倍。
    #[allow(clippy::too_many_arguments)]
    pub fn load_segment(
        &self,
        proc: &ProcessVm,
        file: &Arc<dyn MmFile>,
        offset: usize,
        upage: Vaddr,
        read_bytes: usize,
        zero_bytes: usize,
        writable: bool,
    ) -> VmResult<()> {
        if !upage.is_page_aligned()
            || offset % PAGE_SIZE != 0
            || (read_bytes + zero_bytes) % PAGE_SIZE != 0
        {
            return Err(VmError::Misaligned);
        }
        let pages = (read_bytes + zero_bytes) / PAGE_SIZE;
        let end = upage
            .nth_page(pages)
            .filter(|end| end.as_usize() <= self.config.user_top)
            .ok_or(VmError::BadAddress)?;

        let mut spt = proc.spt().lock();
        if !spt.range_is_free(upage, pages) {
            return Err(VmError::Overlap);
        }
        let mut remaining = read_bytes;
        for i in 0..pages {
            let page_read = remaining.min(PAGE_SIZE);
            remaining -= page_read;
            let page = upage + i * PAGE_SIZE;
            spt.insert_file_backed(
                page,
                file.clone(),
                offset + i * PAGE_SIZE,
                page_read,
                PAGE_SIZE - page_read,
                writable,
            );
        }
        log::debug!(
            "vm: pid {} segment {:?}..{:?} registered ({} pages)",
            proc.pid(),
            upage,
            end,
            pages
        );
        Ok(())
    }
}
