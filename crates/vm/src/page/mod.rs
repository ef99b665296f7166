//! 补充页表
//!
//! 每个用户进程一张，记录每个用户页在不驻留内存时的内容来源：
//!
//! - [`PageBacking::File`]：从文件的某段读取，余下部分补零
//! - [`PageBacking::Zero`]：全零页（栈增长）
//! - [`PageBacking::Swapped`]：内容在交换槽中
//!
//! 页是否驻留只由硬件页表决定；驻留页的表项只在被置换时才会被读取。
//! 补充页表本身不加锁，由 [`ProcessVm`](crate::ProcessVm) 用 `SpinMutex` 包装。

mod load;

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use crate::address::{AlignOps, Vaddr};
use crate::config::PAGE_SIZE;
use crate::file::MmFile;
use crate::swap::SwapSlot;

/// 文件来源描述
#[derive(Clone)]
pub struct FileBacking {
    /// 文件句柄
    pub file: Arc<dyn MmFile>,
    /// 页内容在文件中的起始偏移
    pub offset: usize,
    /// 从文件读取的字节数
    pub read_bytes: usize,
    /// 读取之后补零的字节数
    pub zero_bytes: usize,
}

impl fmt::Debug for FileBacking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBacking")
            .field("offset", &self.offset)
            .field("read_bytes", &self.read_bytes)
            .field("zero_bytes", &self.zero_bytes)
            .finish_non_exhaustive()
    }
}

/// 页内容来源
#[derive(Debug, Clone)]
pub enum PageBacking {
    /// 文件
    File(FileBacking),
    /// 全零
    Zero,
    /// 交换槽
    ///
    /// 内容已换回内存后为 `None`：槽已释放，表项只等待下一次置换时被改写。
    Swapped(Option<SwapSlot>),
}

/// 补充页表项
#[derive(Debug, Clone)]
pub struct PageEntry {
    upage: Vaddr,
    backing: PageBacking,
    writable: bool,
    dirty: bool,
}

impl PageEntry {
    /// 页起始地址
    pub fn upage(&self) -> Vaddr {
        self.upage
    }

    /// 内容来源
    pub fn backing(&self) -> &PageBacking {
        &self.backing
    }

    /// 是否以可写方式映射
    pub fn writable(&self) -> bool {
        self.writable
    }

    /// 页内容在某次驻留期间是否被写过
    ///
    /// 硬件 dirty 位在换出时随映射一起消失，这里保留下来供 `munmap` 写回使用。
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    /// 是否属于交换区
    pub fn is_swapped(&self) -> bool {
        matches!(self.backing, PageBacking::Swapped(_))
    }

    /// 仍占用的交换槽
    pub fn swap_slot(&self) -> Option<SwapSlot> {
        match self.backing {
            PageBacking::Swapped(slot) => slot,
            _ => None,
        }
    }

    /// 被换出：记录新槽并累积 dirty
    pub(crate) fn mark_swapped(&mut self, slot: SwapSlot, dirty: bool) {
        self.backing = PageBacking::Swapped(Some(slot));
        self.dirty |= dirty;
    }

    /// 换入完成：槽已由交换区释放
    pub(crate) fn mark_swapped_in(&mut self) {
        self.backing = PageBacking::Swapped(None);
    }
}

/// 补充页表
#[derive(Debug, Default)]
pub struct SupplementalPageTable {
    entries: BTreeMap<Vaddr, PageEntry>,
}

impl SupplementalPageTable {
    /// 创建空表
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    fn insert(&mut self, upage: Vaddr, backing: PageBacking, writable: bool) -> bool {
        debug_assert!(upage.is_page_aligned());
        if self.entries.contains_key(&upage) {
            log::warn!("spt: duplicate entry for {:?}", upage);
            return false;
        }
        self.entries.insert(
            upage,
            PageEntry {
                upage,
                backing,
                writable,
                dirty: false,
            },
        );
        true
    }

    /// 登记文件来源页，`read_bytes + zero_bytes` 必须等于页大小
    pub fn insert_file_backed(
        &mut self,
        upage: Vaddr,
        file: Arc<dyn MmFile>,
        offset: usize,
        read_bytes: usize,
        zero_bytes: usize,
        writable: bool,
    ) -> bool {
        debug_assert_eq!(read_bytes + zero_bytes, PAGE_SIZE);
        let backing = PageBacking::File(FileBacking {
            file,
            offset,
            read_bytes,
            zero_bytes,
        });
        self.insert(upage, backing, writable)
    }

    /// 登记全零页，总是可写
    pub fn insert_zero_fill(&mut self, upage: Vaddr) -> bool {
        self.insert(upage, PageBacking::Zero, true)
    }

    /// 登记已在交换槽中的页
    pub fn insert_swapped(&mut self, upage: Vaddr, writable: bool, slot: SwapSlot) -> bool {
        self.insert(upage, PageBacking::Swapped(Some(slot)), writable)
    }

    /// 删除表项，调用者负责先解除映射并归还帧
    pub fn delete(&mut self, upage: Vaddr) -> Option<PageEntry> {
        self.entries.remove(&upage)
    }

    /// 查找 `addr` 所在页的表项
    pub fn lookup(&self, addr: Vaddr) -> Option<&PageEntry> {
        self.entries.get(&addr.page())
    }

    pub(crate) fn lookup_mut(&mut self, upage: Vaddr) -> Option<&mut PageEntry> {
        self.entries.get_mut(&upage)
    }

    /// `addr` 所在页是否存在表项
    pub fn contains(&self, addr: Vaddr) -> bool {
        self.entries.contains_key(&addr.page())
    }

    /// 从 `start` 起连续 `pages` 页是否都没有表项
    pub fn range_is_free(&self, start: Vaddr, pages: usize) -> bool {
        let end = start + pages * PAGE_SIZE;
        self.entries.range(start..end).next().is_none()
    }

    /// 表项数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 取出全部表项
    pub(crate) fn drain(&mut self) -> Vec<PageEntry> {
        core::mem::take(&mut self.entries).into_values().collect()
    }
}
