//! 按补充页表项装载页面

use alloc::sync::Arc;

use crate::address::Vaddr;
use crate::address_space::AddressSpace;
use crate::error::{VmError, VmResult};
use crate::frame::PinGuard;
use crate::manager::VmManager;
use crate::page::{FileBacking, PageBacking};
use crate::process::ProcessVm;
use crate::swap::SwapSlot;

impl VmManager {
    /// 把 `upage` 的内容装入一个新帧并建立映射
    ///
    /// 帧在整个装载过程中保持钉住，映射建立之后才解除。
    /// 任何一步失败都会撤销映射并归还帧。
    pub fn load_page(&self, proc: &Arc<ProcessVm>, upage: Vaddr) -> VmResult<()> {
        let (backing, writable) = {
            let spt = proc.spt().lock();
            let entry = spt.lookup(upage).ok_or(VmError::NoSuchPage)?;
            (entry.backing().clone(), entry.writable())
        };
        let pt = proc.page_table();
        if pt.get_mapping(upage).is_some() {
            return Err(VmError::AlreadyMapped);
        }

        let mut frame = self.frames().allocate(proc, upage)?;
        let result = match &backing {
            PageBacking::File(file) => Self::fill_from_file(&mut frame, file)
                .and_then(|()| Self::install(pt, upage, &frame, writable)),
            PageBacking::Zero => {
                // SAFETY: 新分配的帧被钉住且尚未映射
                unsafe { frame.bytes_mut() }.fill(0);
                Self::install(pt, upage, &frame, writable)
            }
            PageBacking::Swapped(Some(slot)) => Self::install(pt, upage, &frame, writable)
                .and_then(|()| self.swap_in(proc, upage, *slot, &mut frame)),
            PageBacking::Swapped(None) => Err(VmError::StaleSwapEntry),
        };

        match result {
            Ok(()) => {
                log::trace!("vm: pid {} loaded {:?} at {:?}", proc.pid(), upage, frame.paddr());
                Ok(())
            }
            Err(e) => {
                if pt.get_mapping(upage) == Some(frame.paddr()) {
                    pt.clear_mapping(upage);
                }
                if let Err(free_err) = frame.free() {
                    log::error!("vm: failed to release frame after load error: {}", free_err);
                }
                Err(e)
            }
        }
    }

    fn fill_from_file(frame: &mut PinGuard<'_>, file: &FileBacking) -> VmResult<()> {
        // SAFETY: 新分配的帧被钉住且尚未映射
        let bytes = unsafe { frame.bytes_mut() };
        let n = file
            .file
            .read_at(file.offset, &mut bytes[..file.read_bytes])
            .map_err(VmError::File)?;
        if n != file.read_bytes {
            log::error!(
                "vm: short read at offset {}: {} of {} bytes",
                file.offset,
                n,
                file.read_bytes
            );
            return Err(VmError::ShortRead);
        }
        bytes[file.read_bytes..].fill(0);
        Ok(())
    }

    fn install(
        pt: &dyn AddressSpace,
        upage: Vaddr,
        frame: &PinGuard<'_>,
        writable: bool,
    ) -> VmResult<()> {
        if pt.set_mapping(upage, frame.paddr(), writable) {
            Ok(())
        } else {
            Err(VmError::MapFailed)
        }
    }

    fn swap_in(
        &self,
        proc: &ProcessVm,
        upage: Vaddr,
        slot: SwapSlot,
        frame: &mut PinGuard<'_>,
    ) -> VmResult<()> {
        // SAFETY: 帧被钉住，映射刚建立，所属线程正阻塞在本次缺页中
        self.swap().read_in(slot, unsafe { frame.bytes_mut() })?;
        if let Some(entry) = proc.spt().lock().lookup_mut(upage) {
            entry.mark_swapped_in();
        }
        Ok(())
    }
}
