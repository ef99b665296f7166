//! 文件内存映射
//!
//! `mmap` 只登记补充页表项，页面在首次访问时才从文件读入。
//! `munmap` 把写过的页写回文件（不超过文件长度），然后删除表项、归还帧或交换槽。

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use uapi::mm::MapId;

use crate::address::{AlignOps, UsizeConvert, Vaddr};
use crate::config::PAGE_SIZE;
use crate::error::{VmError, VmResult};
use crate::file::MmFile;
use crate::manager::VmManager;
use crate::page::{PageBacking, PageEntry};
use crate::process::ProcessVm;

/// 一个文件映射
pub struct MmapRegion {
    id: MapId,
    base: Vaddr,
    pages: usize,
    len: usize,
    file: Arc<dyn MmFile>,
}

impl MmapRegion {
    /// 映射 ID
    pub fn id(&self) -> MapId {
        self.id
    }

    /// 起始地址
    pub fn base(&self) -> Vaddr {
        self.base
    }

    /// 页数
    pub fn page_count(&self) -> usize {
        self.pages
    }

    /// 映射时的文件长度
    pub fn len(&self) -> usize {
        self.len
    }

    /// 文件长度为 0 的映射不存在
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 第 `i` 页的起始地址
    pub fn page(&self, i: usize) -> Vaddr {
        self.base + i * PAGE_SIZE
    }

    /// 第 `i` 页写回文件的字节数，最后一页不超过文件末尾
    pub fn write_back_len(&self, i: usize) -> usize {
        self.len.saturating_sub(i * PAGE_SIZE).min(PAGE_SIZE)
    }
}

impl fmt::Debug for MmapRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MmapRegion")
            .field("id", &self.id)
            .field("base", &self.base)
            .field("pages", &self.pages)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// 每进程的映射表
#[derive(Debug, Default)]
pub struct MmapTable {
    regions: BTreeMap<MapId, MmapRegion>,
    next_id: MapId,
}

impl MmapTable {
    /// 创建空表
    pub fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
            next_id: 0,
        }
    }

    fn insert(&mut self, base: Vaddr, pages: usize, len: usize, file: Arc<dyn MmFile>) -> MapId {
        let id = self.next_id;
        self.next_id += 1;
        self.regions.insert(
            id,
            MmapRegion {
                id,
                base,
                pages,
                len,
                file,
            },
        );
        id
    }

    fn remove(&mut self, id: MapId) -> Option<MmapRegion> {
        self.regions.remove(&id)
    }

    /// 查找映射
    pub fn get(&self, id: MapId) -> Option<&MmapRegion> {
        self.regions.get(&id)
    }

    /// 全部映射 ID
    pub fn ids(&self) -> Vec<MapId> {
        self.regions.keys().copied().collect()
    }

    /// 映射数
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// 是否没有映射
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl VmManager {
    /// 把 `file` 的全部内容映射到从 `addr` 开始的连续页
    ///
    /// 映射持有文件的独立句柄。地址为 0、未按页对齐、文件为空、
    /// 或范围内任何一页已被使用时失败，且不留下任何表项。
    pub fn mmap(&self, proc: &ProcessVm, file: &Arc<dyn MmFile>, addr: usize) -> VmResult<MapId> {
        self.try_mmap(proc, file, addr).inspect_err(|e| {
            log::warn!("vm: pid {} mmap at {:#x} failed: {}", proc.pid(), addr, e);
        })
    }

    fn try_mmap(&self, proc: &ProcessVm, file: &Arc<dyn MmFile>, addr: usize) -> VmResult<MapId> {
        let base = Vaddr::new(addr);
        if addr == 0 {
            return Err(VmError::BadAddress);
        }
        if !base.is_page_aligned() {
            return Err(VmError::Misaligned);
        }
        let len = file.len();
        if len == 0 {
            return Err(VmError::EmptyFile);
        }
        let pages = len.div_ceil(PAGE_SIZE);
        base.nth_page(pages)
            .filter(|end| end.as_usize() <= self.config().user_top)
            .ok_or(VmError::BadAddress)?;

        let file = file.reopen().map_err(VmError::File)?;
        {
            let mut spt = proc.spt().lock();
            let pt = proc.page_table();
            let mapped = (0..pages).any(|i| pt.get_mapping(base + i * PAGE_SIZE).is_some());
            if mapped || !spt.range_is_free(base, pages) {
                drop(spt);
                file.close();
                return Err(VmError::Overlap);
            }
            for i in 0..pages {
                let offset = i * PAGE_SIZE;
                let read_bytes = (len - offset).min(PAGE_SIZE);
                spt.insert_file_backed(
                    base + offset,
                    file.clone(),
                    offset,
                    read_bytes,
                    PAGE_SIZE - read_bytes,
                    true,
                );
            }
        }
        let id = proc.mmaps().lock().insert(base, pages, len, file);
        log::debug!("vm: pid {} mmap {} at {:?} ({} pages)", proc.pid(), id, base, pages);
        Ok(id)
    }

    /// 解除映射 `id`
    ///
    /// 写过的页写回文件；无论写回是否成功，表项都会删除、文件句柄都会关闭，
    /// 返回遇到的第一个写回错误。
    pub fn munmap(&self, proc: &ProcessVm, id: MapId) -> VmResult<()> {
        let Some(region) = proc.mmaps().lock().remove(id) else {
            log::warn!("vm: pid {} munmap of unknown mapping {}", proc.pid(), id);
            return Err(VmError::UnknownMapping);
        };
        let mut first_err = None;
        for i in 0..region.pages {
            if let Err(e) = self.unmap_page(proc, &region, i) {
                log::error!("vm: pid {} munmap {} page {}: {}", proc.pid(), id, i, e);
                first_err.get_or_insert(e);
            }
        }
        region.file.close();
        log::debug!("vm: pid {} munmap {}", proc.pid(), id);
        first_err.map_or(Ok(()), Err)
    }

    fn unmap_page(&self, proc: &ProcessVm, region: &MmapRegion, i: usize) -> VmResult<()> {
        let upage = region.page(i);
        let pt = proc.page_table();
        loop {
            if let Some(paddr) = pt.get_mapping(upage) {
                let Some(mut frame) = self.frames().pin(paddr)? else {
                    // 正在被换出，等换出者完成后按非驻留页处理
                    core::hint::spin_loop();
                    continue;
                };
                if pt.get_mapping(upage) != Some(paddr) {
                    continue;
                }
                let (entry, hw_dirty) = {
                    let mut spt = proc.spt().lock();
                    let hw_dirty = pt.is_dirty(upage);
                    pt.clear_mapping(upage);
                    (spt.delete(upage), hw_dirty)
                };
                let dirty = hw_dirty || entry.as_ref().is_some_and(|e| e.dirty());
                let result = if dirty {
                    // SAFETY: 帧被钉住且映射已清除
                    let bytes = unsafe { frame.bytes_mut() };
                    Self::write_back(region, i, bytes)
                } else {
                    Ok(())
                };
                frame.free()?;
                return result;
            }

            let entry = {
                let mut spt = proc.spt().lock();
                // 持锁期间没有映射，说明也没有进行中的换出
                if pt.get_mapping(upage).is_some() {
                    continue;
                }
                spt.delete(upage)
            };
            return match entry {
                Some(entry) => self.discard_nonresident(region, i, &entry),
                None => Err(VmError::NoSuchPage),
            };
        }
    }

    /// 处理不驻留的页：脏页从交换区读回并写回文件，其余只释放交换槽
    fn discard_nonresident(&self, region: &MmapRegion, i: usize, entry: &PageEntry) -> VmResult<()> {
        let PageBacking::Swapped(Some(slot)) = entry.backing() else {
            return Ok(());
        };
        if !entry.dirty() {
            return self.swap().free(*slot);
        }
        let mut page = vec![0u8; PAGE_SIZE];
        if let Err(e) = self.swap().read_in(*slot, &mut page) {
            let _ = self.swap().free(*slot);
            return Err(e);
        }
        Self::write_back(region, i, &page)
    }

    fn write_back(region: &MmapRegion, i: usize, page: &[u8]) -> VmResult<()> {
        let offset = i * PAGE_SIZE;
        let n = region.write_back_len(i);
        match region.file.write_at(offset, &page[..n]) {
            Ok(written) if written == n => Ok(()),
            Ok(written) => {
                log::error!("vm: short write-back at offset {}: {} of {}", offset, written, n);
                Err(VmError::ShortWrite)
            }
            Err(errno) => {
                log::error!("vm: write-back at offset {} failed: {}", offset, errno);
                Err(VmError::File(errno))
            }
        }
    }
}
