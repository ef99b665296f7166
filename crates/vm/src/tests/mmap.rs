use super::*;
use crate::VmError;

const MAP_BASE: usize = 0x1000_0000;

#[test]
fn test_mmap_write_back_on_munmap() {
    let h = harness(4, 4);
    let (proc, pt) = h.process(1);
    let file = patterned_file(5000);
    let original = file.contents();

    let id = h.vm.mmap(&proc, &as_mm_file(&file), MAP_BASE).unwrap();
    assert_eq!(proc.spt().lock().len(), 2);
    assert_eq!(file.open_handles(), 2);
    // 映射是惰性的
    assert!(pt.get(MAP_BASE).is_none());

    h.vm.resolve_fault(&proc, MAP_BASE + 10, STACK_TOP).unwrap();
    assert_eq!(h.page_bytes(&pt, MAP_BASE)[..PG], original[..PG]);
    h.user_write(&pt, MAP_BASE + 10, b"hello");

    h.vm.resolve_fault(&proc, MAP_BASE + PG + 4, STACK_TOP).unwrap();
    let tail = h.page_bytes(&pt, MAP_BASE + PG);
    assert_eq!(tail[..5000 - PG], original[PG..]);
    assert!(tail[5000 - PG..].iter().all(|&b| b == 0));
    h.user_write(&pt, MAP_BASE + PG + 4, b"world");

    h.vm.munmap(&proc, id).unwrap();

    let mut expected = original.clone();
    expected[10..15].copy_from_slice(b"hello");
    expected[PG + 4..PG + 9].copy_from_slice(b"world");
    assert_eq!(file.contents(), expected);
    assert_eq!(file.len(), 5000);
    assert_eq!(file.write_log(), alloc::vec![(0, PG), (PG, 5000 - PG)]);

    assert!(pt.mapped_pages().is_empty());
    assert!(proc.spt().lock().is_empty());
    assert_eq!(h.vm.frames().stats().resident, 0);
    assert_eq!(file.open_handles(), 1);
}

#[test]
fn test_only_dirty_middle_page_is_written_back() {
    let h = harness(4, 4);
    let (proc, pt) = h.process(1);
    let file = patterned_file(10_000);
    let original = file.contents();

    let id = h.vm.mmap(&proc, &as_mm_file(&file), MAP_BASE).unwrap();
    assert_eq!(proc.spt().lock().len(), 3);

    // 首尾两页只读访问
    for page in [MAP_BASE, MAP_BASE + 2 * PG] {
        h.vm.resolve_fault(&proc, page, STACK_TOP).unwrap();
        assert!(pt.touch(page, false));
    }
    h.vm.resolve_fault(&proc, MAP_BASE + PG, STACK_TOP).unwrap();
    h.user_write(&pt, MAP_BASE + PG + 100, b"page2");

    h.vm.munmap(&proc, id).unwrap();

    assert_eq!(file.write_log(), alloc::vec![(PG, PG)]);
    assert_eq!(file.len(), 10_000);
    let mut expected = original;
    expected[PG + 100..PG + 105].copy_from_slice(b"page2");
    assert_eq!(file.contents(), expected);
}

#[test]
fn test_clean_pages_are_not_written_back() {
    let h = harness(4, 4);
    let (proc, pt) = h.process(1);
    let file = patterned_file(2 * PG);
    let id = h.vm.mmap(&proc, &as_mm_file(&file), MAP_BASE).unwrap();
    h.vm.resolve_fault(&proc, MAP_BASE, STACK_TOP).unwrap();
    assert!(pt.touch(MAP_BASE, false));

    h.vm.munmap(&proc, id).unwrap();
    assert!(file.write_log().is_empty());
    assert_eq!(h.pool.free_count(), 4);
}

#[test]
fn test_dirty_page_evicted_before_munmap_is_written_back() {
    let h = harness(1, 4);
    let (proc, pt) = h.process(1);
    let file = patterned_file(2 * PG);
    let id = h.vm.mmap(&proc, &as_mm_file(&file), MAP_BASE).unwrap();

    h.vm.resolve_fault(&proc, MAP_BASE, STACK_TOP).unwrap();
    h.user_write(&pt, MAP_BASE + 1, b"dirty");
    // 装入第二页时第一页被换出，硬件 dirty 位随映射一起消失
    h.vm.resolve_fault(&proc, MAP_BASE + PG, STACK_TOP).unwrap();
    assert!(pt.get(MAP_BASE).is_none());
    assert_eq!(h.vm.swap().stats().used, 1);

    h.vm.munmap(&proc, id).unwrap();
    assert_eq!(&file.contents()[1..6], b"dirty");
    assert_eq!(file.write_log(), alloc::vec![(0, PG)]);
    assert_eq!(h.vm.swap().stats().used, 0);
    assert_eq!(h.vm.frames().stats().resident, 0);
}

#[test]
fn test_clean_swapped_page_releases_slot_on_munmap() {
    let h = harness(1, 4);
    let (proc, _pt) = h.process(1);
    let file = patterned_file(2 * PG);
    let id = h.vm.mmap(&proc, &as_mm_file(&file), MAP_BASE).unwrap();
    h.vm.resolve_fault(&proc, MAP_BASE, STACK_TOP).unwrap();
    h.vm.resolve_fault(&proc, MAP_BASE + PG, STACK_TOP).unwrap();
    assert_eq!(h.vm.swap().stats().used, 1);

    h.vm.munmap(&proc, id).unwrap();
    assert!(file.write_log().is_empty());
    assert_eq!(h.vm.swap().stats().used, 0);
}

#[test]
fn test_mmap_rejects_bad_arguments() {
    let h = harness(2, 2);
    let (proc, _pt) = h.process(1);
    let file = patterned_file(100);
    let handle = as_mm_file(&file);

    assert_eq!(h.vm.mmap(&proc, &handle, 0), Err(VmError::BadAddress));
    assert_eq!(h.vm.mmap(&proc, &handle, MAP_BASE + 1), Err(VmError::Misaligned));
    assert_eq!(h.vm.mmap(&proc, &handle, STACK_TOP), Err(VmError::BadAddress));

    let empty = as_mm_file(&patterned_file(0));
    assert_eq!(h.vm.mmap(&proc, &empty, MAP_BASE), Err(VmError::EmptyFile));

    assert!(proc.spt().lock().is_empty());
    assert_eq!(file.open_handles(), 1);
}

#[test]
fn test_overlapping_mmap_creates_no_entries() {
    let h = harness(2, 2);
    let (proc, _pt) = h.process(1);
    let code = as_mm_file(&patterned_file(PG));
    h.vm
        .load_segment(&proc, &code, 0, Vaddr::new(MAP_BASE + 2 * PG), PG, 0, false)
        .unwrap();

    // 3 页的映射与已有代码页的最后一页重叠
    let file = patterned_file(3 * PG);
    assert_eq!(
        h.vm.mmap(&proc, &as_mm_file(&file), MAP_BASE),
        Err(VmError::Overlap)
    );
    assert_eq!(proc.spt().lock().len(), 1);
    assert!(!proc.spt().lock().contains(Vaddr::new(MAP_BASE)));
    assert_eq!(file.open_handles(), 1);

    // 两次映射不能重叠
    let small = patterned_file(PG);
    h.vm.mmap(&proc, &as_mm_file(&small), MAP_BASE).unwrap();
    assert_eq!(
        h.vm.mmap(&proc, &as_mm_file(&small), MAP_BASE),
        Err(VmError::Overlap)
    );
}

#[test]
fn test_mapping_survives_close_of_original_handle() {
    let h = harness(2, 2);
    let (proc, pt) = h.process(1);
    let file = patterned_file(PG);
    let id = h.vm.mmap(&proc, &as_mm_file(&file), MAP_BASE).unwrap();
    file.close();

    h.vm.resolve_fault(&proc, MAP_BASE, STACK_TOP).unwrap();
    h.user_write(&pt, MAP_BASE, b"x");
    h.vm.munmap(&proc, id).unwrap();
    assert_eq!(file.contents()[0], b'x');
}

#[test]
fn test_munmap_unknown_id() {
    let h = harness(1, 1);
    let (proc, _pt) = h.process(1);
    assert_eq!(h.vm.munmap(&proc, 7), Err(VmError::UnknownMapping));

    let file = patterned_file(10);
    let id = h.vm.mmap(&proc, &as_mm_file(&file), MAP_BASE).unwrap();
    h.vm.munmap(&proc, id).unwrap();
    assert_eq!(h.vm.munmap(&proc, id), Err(VmError::UnknownMapping));
}

#[test]
fn test_mapping_ids_are_distinct() {
    let h = harness(1, 1);
    let (proc, _pt) = h.process(1);
    let file = as_mm_file(&patterned_file(10));
    let a = h.vm.mmap(&proc, &file, MAP_BASE).unwrap();
    let b = h.vm.mmap(&proc, &file, MAP_BASE + PG).unwrap();
    assert_ne!(a, b);
    assert!(a >= 0 && b >= 0);
    assert_eq!(proc.mmaps().lock().len(), 2);
    assert_eq!(proc.mmaps().lock().get(b).unwrap().base(), Vaddr::new(MAP_BASE + PG));
}
