//! 内核访问用户内存
//!
//! 逐页处理用户缓冲区：页不驻留时先经缺页路径装入，再钉住其帧、
//! 确认映射仍指向被钉住的帧，最后通过帧的内核别名读写。
//! 钉住期间该页不会被换出，因此可以在访问中途进行文件 I/O。

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::address::Vaddr;
use crate::config::PAGE_SIZE;
use crate::error::{VmError, VmResult};
use crate::frame::PinGuard;
use crate::manager::VmManager;
use crate::process::ProcessVm;

impl VmManager {
    /// 装入并钉住 `addr` 所在的用户页
    ///
    /// `write` 为真时要求该页可写。`sp` 用于判断是否允许栈增长。
    pub fn pin_user_page(
        &self,
        proc: &Arc<ProcessVm>,
        addr: usize,
        sp: usize,
        write: bool,
    ) -> VmResult<PinGuard<'_>> {
        if addr == 0 || addr >= self.config().user_top {
            return Err(VmError::BadAddress);
        }
        let upage = Vaddr::new(addr).page();
        let pt = proc.page_table();
        loop {
            let Some(paddr) = pt.get_mapping(upage) else {
                self.resolve_fault(proc, addr, sp)?;
                continue;
            };
            if write && !pt.is_writable(upage) {
                return Err(VmError::ProtectionFault);
            }
            match self.frames().pin(paddr) {
                Ok(Some(guard)) if pt.get_mapping(upage) == Some(paddr) => return Ok(guard),
                Ok(Some(_)) => {}
                Ok(None) => core::hint::spin_loop(),
                // 帧已被归还，映射随后就会消失
                Err(VmError::FrameNotTracked) if pt.get_mapping(upage) != Some(paddr) => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// 以页为单位遍历用户缓冲区 `[uaddr, uaddr + len)`
    ///
    /// `f` 收到当前页内的一段和它在整个缓冲区中的偏移，返回处理的字节数；
    /// 返回值小于段长时停止遍历。返回处理的总字节数。
    pub(crate) fn for_each_user_chunk<F>(
        &self,
        proc: &Arc<ProcessVm>,
        uaddr: usize,
        len: usize,
        sp: usize,
        write: bool,
        mut f: F,
    ) -> VmResult<usize>
    where
        F: FnMut(&mut [u8], usize) -> VmResult<usize>,
    {
        if uaddr == 0 || uaddr >= self.config().user_top {
            return Err(VmError::BadAddress);
        }
        let end = uaddr.checked_add(len).ok_or(VmError::BadAddress)?;
        if end > self.config().user_top {
            return Err(VmError::BadAddress);
        }
        let pt = proc.page_table();
        let mut done = 0;
        while done < len {
            let addr = uaddr + done;
            let offset = addr % PAGE_SIZE;
            let n = (PAGE_SIZE - offset).min(len - done);
            let mut frame = self.pin_user_page(proc, addr, sp, write)?;
            // SAFETY: 帧被钉住，内核只在这里通过别名访问它
            let chunk = &mut unsafe { frame.bytes_mut() }[offset..offset + n];
            let handled = f(chunk, done)?;
            let upage = Vaddr::new(addr).page();
            pt.set_accessed(upage, true);
            if write && handled > 0 {
                // 经内核别名写入不会置位用户页表项的 dirty
                pt.set_dirty(upage, true);
            }
            drop(frame);
            done += handled.min(n);
            if handled < n {
                break;
            }
        }
        Ok(done)
    }

    /// 从用户缓冲区复制到 `dst`
    pub fn copy_from_user(
        &self,
        proc: &Arc<ProcessVm>,
        uaddr: usize,
        dst: &mut [u8],
        sp: usize,
    ) -> VmResult<()> {
        self.for_each_user_chunk(proc, uaddr, dst.len(), sp, false, |chunk, off| {
            dst[off..off + chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        })?;
        Ok(())
    }

    /// 把 `src` 复制到用户缓冲区
    pub fn copy_to_user(
        &self,
        proc: &Arc<ProcessVm>,
        uaddr: usize,
        src: &[u8],
        sp: usize,
    ) -> VmResult<()> {
        self.for_each_user_chunk(proc, uaddr, src.len(), sp, true, |chunk, off| {
            chunk.copy_from_slice(&src[off..off + chunk.len()]);
            Ok(chunk.len())
        })?;
        Ok(())
    }

    /// 读取以 NUL 结尾的用户字符串，最长 `max_len` 字节（不含 NUL）
    pub fn read_user_str(
        &self,
        proc: &Arc<ProcessVm>,
        uaddr: usize,
        max_len: usize,
        sp: usize,
    ) -> VmResult<String> {
        let mut bytes = Vec::new();
        let mut terminated = false;
        let limit = max_len.saturating_add(1).min(self.config().user_top.saturating_sub(uaddr));
        self.for_each_user_chunk(proc, uaddr, limit, sp, false, |chunk, _| {
            match chunk.iter().position(|&b| b == 0) {
                Some(nul) => {
                    bytes.extend_from_slice(&chunk[..nul]);
                    terminated = true;
                    Ok(nul)
                }
                None => {
                    bytes.extend_from_slice(chunk);
                    Ok(chunk.len())
                }
            }
        })?;
        if !terminated {
            return Err(VmError::BadAddress);
        }
        String::from_utf8(bytes).map_err(|_| VmError::BadAddress)
    }
}
