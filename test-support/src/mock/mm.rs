//! 内存管理相关操作的 Mock 实现
//!
//! 注意：这里不直接依赖 `vm` crate（避免循环依赖）。
//! `vm` crate 在 `cfg(test)` 下为这些类型实现其 trait（例如 `AddressSpace` / `PhysPageAllocator`）。

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::vec::Vec;

/// Mock 使用的页大小
pub const MOCK_PAGE_SIZE: usize = 4096;

/// Mock 页表项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockPte {
    pub paddr: usize,
    pub writable: bool,
    pub accessed: bool,
    pub dirty: bool,
}

/// Mock 的用户页表
///
/// 以页对齐的虚拟地址为键。`touch` 模拟硬件访问时置位 accessed/dirty。
pub struct MockPageTable {
    entries: Mutex<BTreeMap<usize, MockPte>>,
}

impl MockPageTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, vaddr: usize) -> Option<MockPte> {
        self.entries.lock().unwrap().get(&vaddr).copied()
    }

    /// 建立映射，已存在时返回 false
    pub fn map(&self, vaddr: usize, paddr: usize, writable: bool) -> bool {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(&vaddr) {
            return false;
        }
        entries.insert(
            vaddr,
            MockPte {
                paddr,
                writable,
                accessed: false,
                dirty: false,
            },
        );
        true
    }

    pub fn unmap(&self, vaddr: usize) -> Option<MockPte> {
        self.entries.lock().unwrap().remove(&vaddr)
    }

    pub fn set_accessed(&self, vaddr: usize, accessed: bool) {
        if let Some(pte) = self.entries.lock().unwrap().get_mut(&vaddr) {
            pte.accessed = accessed;
        }
    }

    pub fn set_dirty(&self, vaddr: usize, dirty: bool) {
        if let Some(pte) = self.entries.lock().unwrap().get_mut(&vaddr) {
            pte.dirty = dirty;
        }
    }

    /// 模拟用户态访问：置 accessed，写访问再置 dirty。未映射时返回 false
    pub fn touch(&self, vaddr: usize, write: bool) -> bool {
        match self.entries.lock().unwrap().get_mut(&vaddr) {
            Some(pte) => {
                pte.accessed = true;
                pte.dirty |= write;
                true
            }
            None => false,
        }
    }

    pub fn mapped_pages(&self) -> Vec<usize> {
        self.entries.lock().unwrap().keys().copied().collect()
    }
}

impl Default for MockPageTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Mock 的用户物理页池
///
/// 在宿主堆上申请一段页对齐内存，物理地址与内核虚拟地址恒等映射。
/// 分配总是返回当前最低的空闲页，便于测试断言。
pub struct MockPagePool {
    base: usize,
    pages: usize,
    free: Mutex<Vec<usize>>,
}

// SAFETY: base 指向的内存只通过 vm 的帧访问接口读写，free 列表由 Mutex 保护
unsafe impl Send for MockPagePool {}
unsafe impl Sync for MockPagePool {}

impl MockPagePool {
    pub fn new(pages: usize) -> Self {
        let layout = Self::layout(pages);
        // SAFETY: layout 大小非零
        let base = unsafe { alloc_zeroed(layout) } as usize;
        assert!(base != 0, "mock page pool allocation failed");
        // 倒序存放，pop 得到最低地址
        let free = (0..pages).rev().map(|i| base + i * MOCK_PAGE_SIZE).collect();
        Self {
            base,
            pages,
            free: Mutex::new(free),
        }
    }

    fn layout(pages: usize) -> Layout {
        Layout::from_size_align(pages.max(1) * MOCK_PAGE_SIZE, MOCK_PAGE_SIZE).unwrap()
    }

    pub fn get_user_page(&self) -> Option<usize> {
        self.free.lock().unwrap().pop()
    }

    pub fn free_user_page(&self, paddr: usize) {
        assert!(self.contains(paddr), "freeing foreign page {paddr:#x}");
        let mut free = self.free.lock().unwrap();
        assert!(!free.contains(&paddr), "double free of page {paddr:#x}");
        free.push(paddr);
        free.sort_unstable_by(|a, b| b.cmp(a));
    }

    /// 恒等映射
    pub fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        paddr
    }

    pub fn contains(&self, paddr: usize) -> bool {
        paddr >= self.base
            && paddr < self.base + self.pages * MOCK_PAGE_SIZE
            && (paddr - self.base) % MOCK_PAGE_SIZE == 0
    }

    pub fn free_count(&self) -> usize {
        self.free.lock().unwrap().len()
    }

    pub fn total_pages(&self) -> usize {
        self.pages
    }

    /// 直接读取某个物理页的内容
    pub fn read_page(&self, paddr: usize) -> Vec<u8> {
        assert!(self.contains(paddr));
        // SAFETY: paddr 位于池内且页对齐
        unsafe { std::slice::from_raw_parts(paddr as *const u8, MOCK_PAGE_SIZE).to_vec() }
    }

    /// 直接改写某个物理页中的字节，模拟用户态写入
    pub fn write_bytes(&self, paddr: usize, offset: usize, bytes: &[u8]) {
        assert!(self.contains(paddr) && offset + bytes.len() <= MOCK_PAGE_SIZE);
        // SAFETY: 范围检查见上
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), (paddr + offset) as *mut u8, bytes.len());
        }
    }
}

impl Drop for MockPagePool {
    fn drop(&mut self) {
        // SAFETY: base 由 new 中同一 layout 分配
        unsafe { dealloc(self.base as *mut u8, Self::layout(self.pages)) };
    }
}
