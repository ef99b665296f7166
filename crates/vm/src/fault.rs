//! 缺页处理与栈增长

use alloc::sync::Arc;

use crate::address::Vaddr;
use crate::error::{VmError, VmResult};
use crate::manager::VmManager;
use crate::process::ProcessVm;

impl VmManager {
    /// 处理用户态缺页
    ///
    /// `addr` 是触发缺页的地址，`sp` 是缺页时的用户栈指针。
    /// 返回错误时调用者应终止该进程。
    pub fn resolve_fault(&self, proc: &Arc<ProcessVm>, addr: usize, sp: usize) -> VmResult<()> {
        self.try_resolve_fault(proc, addr, sp).inspect_err(|e| {
            log::warn!(
                "vm: pid {} fault at {:#x} (sp {:#x}) not resolved: {}",
                proc.pid(),
                addr,
                sp,
                e
            );
        })
    }

    fn try_resolve_fault(&self, proc: &Arc<ProcessVm>, addr: usize, sp: usize) -> VmResult<()> {
        if addr == 0 || addr >= self.config().user_top {
            return Err(VmError::BadAddress);
        }
        let upage = Vaddr::new(addr).page();
        if proc.page_table().get_mapping(upage).is_some() {
            return Err(VmError::ProtectionFault);
        }

        {
            let mut spt = proc.spt().lock();
            // 换出写盘失败时，驱逐方持锁恢复了映射
            if proc.page_table().get_mapping(upage).is_some() {
                return Ok(());
            }
            if !spt.contains(upage) {
                if !self.is_stack_access(addr, sp) {
                    return Err(VmError::BadAddress);
                }
                spt.insert_zero_fill(upage);
                log::debug!("vm: pid {} stack grows to {:?}", proc.pid(), upage);
            }
        }
        self.load_page(proc, upage)
    }

    /// 对 `addr` 的访问是否应当扩展栈
    ///
    /// 地址必须落在栈区 `[user_top - max_stack_size, user_top)` 内，
    /// 且不低于 `sp - stack_slack`。
    pub fn is_stack_access(&self, addr: usize, sp: usize) -> bool {
        let config = self.config();
        addr >= config.stack_bottom()
            && addr < config.user_top
            && addr.saturating_add(config.stack_slack) >= sp
    }
}
