//! vm crate 单元测试
//!
//! 为 test-support 中的 Mock 类型实现本 crate 的 trait，
//! 并提供构造测试用 [`VmManager`] 与进程的辅助函数。

extern crate std;

mod mmap;
mod swap;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use device::{BlockDriver, DeviceType, Driver, RamDisk};
use sync::ArchOps;
use test_support::mock::fs::MockFile;
use test_support::mock::mm::{MockPagePool, MockPageTable};

use crate::{
    AddressSpace, MmFile, Paddr, PhysPageAllocator, ProcessVm, PteFlags, SwapManager,
    UsizeConvert, Vaddr, VmConfig, VmManager,
};

struct DummyArchOps;

impl ArchOps for DummyArchOps {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        0
    }

    unsafe fn restore_interrupts(&self, _flags: usize) {}

    fn sstatus_sie(&self) -> usize {
        0
    }
}

static DUMMY_ARCH_OPS: DummyArchOps = DummyArchOps;
// 0 = uninit, 1 = initializing, 2 = ready
static SYNC_INIT: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn init_sync_arch_ops() {
    match SYNC_INIT.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => {
            // Safety: tests use a single global dummy ArchOps.
            unsafe { sync::register_arch_ops(&DUMMY_ARCH_OPS) };
            SYNC_INIT.store(2, Ordering::Release);
        }
        Err(_) => {
            while SYNC_INIT.load(Ordering::Acquire) != 2 {
                core::hint::spin_loop();
            }
        }
    }
}

impl AddressSpace for MockPageTable {
    fn get_mapping(&self, page: Vaddr) -> Option<Paddr> {
        self.get(page.as_usize()).map(|pte| Paddr::new(pte.paddr))
    }

    fn set_mapping(&self, page: Vaddr, frame: Paddr, writable: bool) -> bool {
        self.map(page.as_usize(), frame.as_usize(), writable)
    }

    fn clear_mapping(&self, page: Vaddr) {
        self.unmap(page.as_usize());
    }

    fn pte_flags(&self, page: Vaddr) -> PteFlags {
        let Some(pte) = self.get(page.as_usize()) else {
            return PteFlags::empty();
        };
        let mut flags = PteFlags::VALID;
        flags.set(PteFlags::WRITABLE, pte.writable);
        flags.set(PteFlags::ACCESSED, pte.accessed);
        flags.set(PteFlags::DIRTY, pte.dirty);
        flags
    }

    fn set_accessed(&self, page: Vaddr, accessed: bool) {
        MockPageTable::set_accessed(self, page.as_usize(), accessed);
    }

    fn set_dirty(&self, page: Vaddr, dirty: bool) {
        MockPageTable::set_dirty(self, page.as_usize(), dirty);
    }
}

impl PhysPageAllocator for MockPagePool {
    fn get_user_page(&self) -> Option<Paddr> {
        MockPagePool::get_user_page(self).map(Paddr::new)
    }

    fn free_user_page(&self, paddr: Paddr) {
        MockPagePool::free_user_page(self, paddr.as_usize());
    }

    fn paddr_to_vaddr(&self, paddr: Paddr) -> usize {
        MockPagePool::paddr_to_vaddr(self, paddr.as_usize())
    }
}

impl MmFile for MockFile {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize> {
        Ok(MockFile::read_at(self, offset, buf))
    }

    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize> {
        Ok(MockFile::write_at(self, offset, buf))
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, isize> {
        Ok(MockFile::read(self, buf))
    }

    fn write(&self, buf: &[u8]) -> Result<usize, isize> {
        Ok(MockFile::write(self, buf))
    }

    fn seek(&self, pos: usize) {
        MockFile::seek(self, pos);
    }

    fn len(&self) -> usize {
        MockFile::len(self)
    }

    fn reopen(&self) -> Result<Arc<dyn MmFile>, isize> {
        Ok(Arc::new(MockFile::reopen(self)))
    }

    fn close(&self) {
        MockFile::close(self);
    }
}

/// 可以注入写失败的交换盘
///
/// 开启 `hold_writes` 后，失败的写请求先停在驱动里，直到 [`FlakyDisk::release_writes`]。
pub(crate) struct FlakyDisk {
    inner: Arc<RamDisk>,
    fail_writes: AtomicBool,
    hold_writes: AtomicBool,
    write_held: AtomicBool,
}

impl FlakyDisk {
    pub(crate) fn new(sectors: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: RamDisk::new(sectors, 512, 0),
            fail_writes: AtomicBool::new(false),
            hold_writes: AtomicBool::new(false),
            write_held: AtomicBool::new(false),
        })
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn hold_failing_writes(&self) {
        self.hold_writes.store(true, Ordering::SeqCst);
        self.fail_writes(true);
    }

    /// 等待某个写请求停在驱动里
    pub(crate) fn wait_for_held_write(&self) {
        while !self.write_held.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
    }

    pub(crate) fn release_writes(&self) {
        self.hold_writes.store(false, Ordering::SeqCst);
    }
}

impl Driver for FlakyDisk {
    fn device_type(&self) -> DeviceType {
        DeviceType::Block
    }

    fn get_id(&self) -> String {
        String::from("flaky")
    }
}

impl BlockDriver for FlakyDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> bool {
        self.inner.read_block(block_id, buf)
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> bool {
        if !self.fail_writes.load(Ordering::SeqCst) {
            return self.inner.write_block(block_id, buf);
        }
        self.write_held.store(true, Ordering::SeqCst);
        while self.hold_writes.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
        false
    }

    fn block_size(&self) -> usize {
        self.inner.block_size()
    }

    fn total_blocks(&self) -> usize {
        self.inner.total_blocks()
    }
}

/// 测试环境：`frames` 个用户帧、`swap_slots` 个交换槽
pub(crate) struct Harness {
    pub vm: VmManager,
    pub pool: Arc<MockPagePool>,
    pub disk: Arc<RamDisk>,
}

pub(crate) fn harness(frames: usize, swap_slots: usize) -> Harness {
    harness_with(VmConfig::new().with_frame_limit(frames), frames, swap_slots)
}

pub(crate) fn harness_with(config: VmConfig, pool_pages: usize, swap_slots: usize) -> Harness {
    init_sync_arch_ops();
    let pool = Arc::new(MockPagePool::new(pool_pages));
    let disk = RamDisk::new(swap_slots * crate::SECTORS_PER_PAGE, crate::SECTOR_SIZE, 0);
    let swap = SwapManager::new(disk.clone()).unwrap();
    let vm = VmManager::new(config, pool.clone(), swap);
    Harness { vm, pool, disk }
}

impl Harness {
    pub(crate) fn process(&self, pid: usize) -> (Arc<ProcessVm>, Arc<MockPageTable>) {
        let pt = Arc::new(MockPageTable::new());
        let proc = self.vm.create_process(pid, pt.clone());
        (proc, pt)
    }

    /// 读取用户页当前内容（必须驻留）
    pub(crate) fn page_bytes(&self, pt: &MockPageTable, upage: usize) -> Vec<u8> {
        let pte = pt.get(upage).expect("page resident");
        self.pool.read_page(pte.paddr)
    }

    /// 模拟用户态写入：改写帧内容并置位 accessed/dirty
    pub(crate) fn user_write(&self, pt: &MockPageTable, addr: usize, bytes: &[u8]) {
        let upage = addr & !(crate::PAGE_SIZE - 1);
        let pte = pt.get(upage).expect("page resident");
        self.pool.write_bytes(pte.paddr, addr - upage, bytes);
        assert!(pt.touch(upage, true));
    }
}

/// 长度为 `len` 的文件，第 i 个字节为 `(i % 251) as u8`
pub(crate) fn patterned_file(len: usize) -> Arc<MockFile> {
    Arc::new(MockFile::new((0..len).map(|i| (i % 251) as u8).collect()))
}

/// 以 trait 对象持有同一个 Mock 文件
pub(crate) fn as_mm_file(file: &Arc<MockFile>) -> Arc<dyn MmFile> {
    file.clone()
}

pub(crate) const STACK_TOP: usize = crate::USER_TOP;
pub(crate) const PG: usize = crate::PAGE_SIZE;
