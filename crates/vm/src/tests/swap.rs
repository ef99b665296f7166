use super::*;
use crate::{PageBacking, SwapSlot, SwapStats, VmError};
use device::register_block_driver;

fn page_of(byte: u8) -> Vec<u8> {
    alloc::vec![byte; PG]
}

fn ram_swap(slots: usize) -> (SwapManager, Arc<RamDisk>) {
    init_sync_arch_ops();
    let disk = RamDisk::new(slots * crate::SECTORS_PER_PAGE, 512, 0);
    (SwapManager::new(disk.clone()).unwrap(), disk)
}

#[test]
fn test_write_out_uses_lowest_free_slot() {
    let (swap, disk) = ram_swap(4);
    assert_eq!(swap.write_out(&page_of(1)).unwrap(), SwapSlot::new(0));
    assert_eq!(swap.write_out(&page_of(2)).unwrap(), SwapSlot::new(1));
    assert_eq!(swap.write_out(&page_of(3)).unwrap(), SwapSlot::new(2));
    assert_eq!(disk.sectors_written(), 3 * crate::SECTORS_PER_PAGE);

    swap.free(SwapSlot::new(1)).unwrap();
    assert_eq!(swap.write_out(&page_of(4)).unwrap(), SwapSlot::new(1));
    assert_eq!(swap.stats(), SwapStats { total: 4, used: 3 });
}

#[test]
fn test_read_in_restores_bytes_and_frees_slot() {
    let (swap, disk) = ram_swap(2);
    let mut page = page_of(0);
    page[0] = 0xAB;
    page[PG - 1] = 0xCD;
    let slot = swap.write_out(&page).unwrap();

    let mut back = page_of(0xFF);
    swap.read_in(slot, &mut back).unwrap();
    assert_eq!(back, page);
    assert_eq!(disk.sectors_read(), crate::SECTORS_PER_PAGE);
    assert!(!swap.is_used(slot));

    assert_eq!(swap.read_in(slot, &mut back), Err(VmError::SlotNotInUse));
    assert_eq!(swap.free(slot), Err(VmError::SlotNotInUse));
    assert_eq!(swap.read_in(SwapSlot::new(99), &mut back), Err(VmError::SlotNotInUse));
}

#[test]
fn test_full_swap_reports_exhaustion() {
    let (swap, _disk) = ram_swap(2);
    swap.write_out(&page_of(1)).unwrap();
    swap.write_out(&page_of(2)).unwrap();
    assert_eq!(swap.write_out(&page_of(3)), Err(VmError::SwapFull));
    assert_eq!(swap.stats().used, 2);
}

#[test]
fn test_slot_count_ignores_partial_tail() {
    init_sync_arch_ops();
    // 70 个槽跨越两个位图字，外加不足一页的尾部扇区
    let disk = RamDisk::new(70 * crate::SECTORS_PER_PAGE + 3, 512, 0);
    let swap = SwapManager::new(disk).unwrap();
    assert_eq!(swap.stats().total, 70);
    for i in 0..70 {
        assert_eq!(swap.write_out(&page_of(i as u8)).unwrap().index(), i);
    }
    assert_eq!(swap.write_out(&page_of(0)), Err(VmError::SwapFull));
}

#[test]
fn test_device_write_failure_releases_slot() {
    init_sync_arch_ops();
    let disk = FlakyDisk::new(4 * crate::SECTORS_PER_PAGE);
    let swap = SwapManager::new(disk.clone()).unwrap();
    disk.fail_writes(true);
    assert_eq!(swap.write_out(&page_of(1)), Err(VmError::DeviceIo));
    assert_eq!(swap.stats().used, 0);
    disk.fail_writes(false);
    assert_eq!(swap.write_out(&page_of(1)).unwrap(), SwapSlot::new(0));
}

#[test]
fn test_rejects_block_size_not_dividing_page() {
    init_sync_arch_ops();
    let disk = RamDisk::new(16, 3000, 0);
    assert!(matches!(
        SwapManager::new(disk),
        Err(VmError::UnsupportedBlockSize)
    ));
}

#[test]
fn test_attach_by_device_id() {
    init_sync_arch_ops();
    register_block_driver(RamDisk::new(2 * crate::SECTORS_PER_PAGE, 512, 4242));
    let swap = SwapManager::attach("ramdisk_4242").unwrap();
    assert_eq!(swap.stats().total, 2);
    assert!(matches!(
        SwapManager::attach("ramdisk_4243"),
        Err(VmError::NoSwapDevice)
    ));
}

#[test]
fn test_evicted_page_round_trips_through_swap() {
    let h = harness(1, 4);
    let (proc, pt) = h.process(1);
    let a = 0x1000_0000;
    let b = 0x1000_1000;
    {
        let mut spt = proc.spt().lock();
        spt.insert_zero_fill(Vaddr::new(a));
        spt.insert_zero_fill(Vaddr::new(b));
    }
    h.vm.load_page(&proc, Vaddr::new(a)).unwrap();
    let pattern: Vec<u8> = (0..PG).map(|i| (i * 7 % 256) as u8).collect();
    h.user_write(&pt, a, &pattern);

    h.vm.load_page(&proc, Vaddr::new(b)).unwrap();
    let slot = {
        let spt = proc.spt().lock();
        let entry = spt.lookup(Vaddr::new(a)).unwrap();
        assert!(entry.dirty());
        assert!(entry.is_swapped());
        entry.swap_slot().unwrap()
    };
    assert!(h.vm.swap().is_used(slot));

    h.vm.resolve_fault(&proc, a + 5, STACK_TOP).unwrap();
    assert_eq!(h.page_bytes(&pt, a), pattern);
    assert!(!h.vm.swap().is_used(slot));
    assert!(matches!(
        proc.spt().lock().lookup(Vaddr::new(a)).unwrap().backing(),
        PageBacking::Swapped(None)
    ));
}
