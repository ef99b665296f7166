//! 硬件页表抽象
//!
//! 由体系结构层为每个用户进程提供一个实现。
//! 所有方法都以页对齐的用户虚拟地址为参数，并通过内部可变性修改页表，
//! 因为帧表在置换时需要从别的线程访问牺牲页所属进程的页表。

use bitflags::bitflags;

use crate::address::{Paddr, Vaddr};

bitflags! {
    /// 页表项标志位
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u8 {
        /// 映射有效
        const VALID = 1 << 0;
        /// 用户可写
        const WRITABLE = 1 << 1;
        /// 自上次清零以来被访问过
        const ACCESSED = 1 << 2;
        /// 自映射建立以来被写过
        const DIRTY = 1 << 3;
    }
}

/// 单个用户进程的硬件页表
pub trait AddressSpace: Send + Sync {
    /// 查询 `page` 映射到的物理帧
    fn get_mapping(&self, page: Vaddr) -> Option<Paddr>;

    /// 建立映射，页已映射或页表分配失败时返回 false
    fn set_mapping(&self, page: Vaddr, frame: Paddr, writable: bool) -> bool;

    /// 清除映射，之后对该页的访问会触发缺页
    fn clear_mapping(&self, page: Vaddr);

    /// 读取页表项标志位，未映射时返回空
    fn pte_flags(&self, page: Vaddr) -> PteFlags;

    /// 设置或清除 accessed 位
    fn set_accessed(&self, page: Vaddr, accessed: bool);

    /// 设置或清除 dirty 位
    ///
    /// 内核经由物理帧别名写入用户页时，硬件不会置位 dirty，需要手动标记。
    fn set_dirty(&self, page: Vaddr, dirty: bool);

    /// 页是否被写过
    fn is_dirty(&self, page: Vaddr) -> bool {
        self.pte_flags(page).contains(PteFlags::DIRTY)
    }

    /// 页是否被访问过
    fn is_accessed(&self, page: Vaddr) -> bool {
        self.pte_flags(page).contains(PteFlags::ACCESSED)
    }

    /// 页是否可写
    fn is_writable(&self, page: Vaddr) -> bool {
        self.pte_flags(page).contains(PteFlags::WRITABLE)
    }
}
