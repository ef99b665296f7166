//! 用户物理页分配器抽象与帧内容访问

use crate::address::{Paddr, UsizeConvert};
use crate::config::PAGE_SIZE;

/// 用户物理页分配器
///
/// 帧表只在未达到帧上限时向它申请新页，其余时候靠置换腾出帧。
pub trait PhysPageAllocator: Send + Sync {
    /// 申请一个用户物理页，分配器耗尽时返回 None
    fn get_user_page(&self) -> Option<Paddr>;

    /// 归还物理页
    fn free_user_page(&self, paddr: Paddr);

    /// 物理地址到内核可访问虚拟地址的转换
    fn paddr_to_vaddr(&self, paddr: Paddr) -> usize;
}

/// 以字节切片访问整个物理帧
///
/// # Safety
/// 调用者必须保证在返回的切片存活期间独占该帧：
/// 帧处于钉住或正在换出状态，且没有其它内核路径同时写它。
pub(crate) unsafe fn frame_bytes<'a>(phys: &dyn PhysPageAllocator, paddr: Paddr) -> &'a mut [u8] {
    let kva = phys.paddr_to_vaddr(paddr);
    debug_assert_eq!(paddr.as_usize() % PAGE_SIZE, 0);
    // SAFETY: paddr 是分配器给出的整页，kva 在内核地址空间中有效
    unsafe { core::slice::from_raw_parts_mut(kva as *mut u8, PAGE_SIZE) }
}
