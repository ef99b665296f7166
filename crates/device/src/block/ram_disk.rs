//! 内存模拟块设备

use super::BlockDriver;
use crate::driver::{DeviceType, Driver};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use sync::SpinLock;

/// 内存模拟的块设备
///
/// 记录读写的扇区数，便于观察上层的 I/O 次数。
pub struct RamDisk {
    data: SpinLock<Vec<u8>>,
    block_size: usize,
    device_id: usize,
    sectors_read: AtomicUsize,
    sectors_written: AtomicUsize,
}

impl RamDisk {
    /// 创建 `sectors` 个扇区、每扇区 `block_size` 字节的内存磁盘
    pub fn new(sectors: usize, block_size: usize, device_id: usize) -> Arc<Self> {
        Self::from_bytes(vec![0u8; sectors * block_size], block_size, device_id)
    }

    /// 从字节数组创建，尾部不足一个扇区的部分不可访问
    pub fn from_bytes(data: Vec<u8>, block_size: usize, device_id: usize) -> Arc<Self> {
        Arc::new(Self {
            data: SpinLock::new(data),
            block_size,
            device_id,
            sectors_read: AtomicUsize::new(0),
            sectors_written: AtomicUsize::new(0),
        })
    }

    /// 成功读取的扇区数
    pub fn sectors_read(&self) -> usize {
        self.sectors_read.load(Ordering::Relaxed)
    }

    /// 成功写入的扇区数
    pub fn sectors_written(&self) -> usize {
        self.sectors_written.load(Ordering::Relaxed)
    }

    fn sector_range(&self, block_id: usize, len: usize, buf_len: usize) -> Option<(usize, usize)> {
        if buf_len != self.block_size {
            return None;
        }
        let start = block_id.checked_mul(self.block_size)?;
        let end = start.checked_add(self.block_size)?;
        if end > len {
            return None;
        }
        Some((start, end))
    }
}

impl Driver for RamDisk {
    fn device_type(&self) -> DeviceType {
        DeviceType::Block
    }

    fn get_id(&self) -> String {
        alloc::format!("ramdisk_{}", self.device_id)
    }
}

impl BlockDriver for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> bool {
        let data = self.data.lock();
        let Some((start, end)) = self.sector_range(block_id, data.len(), buf.len()) else {
            return false;
        };
        buf.copy_from_slice(&data[start..end]);
        self.sectors_read.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> bool {
        let mut data = self.data.lock();
        let Some((start, end)) = self.sector_range(block_id, data.len(), buf.len()) else {
            return false;
        };
        data[start..end].copy_from_slice(buf);
        self.sectors_written.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn total_blocks(&self) -> usize {
        self.data.lock().len() / self.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{find_block_driver, register_block_driver};
    use core::sync::atomic::{AtomicUsize, Ordering};
    use sync::ArchOps;

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

    fn init_sync_arch_ops() {
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

    #[test]
    fn test_ramdisk_sector_roundtrip_counts_transfers() {
        init_sync_arch_ops();
        let rd = RamDisk::new(8, 512, 1);
        assert_eq!(rd.block_size(), 512);
        assert_eq!(rd.total_blocks(), 8);

        let mut wbuf = [0u8; 512];
        wbuf[0] = 0xAA;
        wbuf[511] = 0x55;
        assert!(rd.write_block(3, &wbuf));

        let mut rbuf = [0u8; 512];
        assert!(rd.read_block(3, &mut rbuf));
        assert_eq!(rbuf, wbuf);

        let mut untouched = [0xFFu8; 512];
        assert!(rd.read_block(2, &mut untouched));
        assert_eq!(untouched, [0u8; 512]);

        assert_eq!(rd.sectors_written(), 1);
        assert_eq!(rd.sectors_read(), 2);
    }

    #[test]
    fn test_ramdisk_rejects_out_of_range_and_short_buffers() {
        init_sync_arch_ops();
        let rd = RamDisk::new(2, 512, 2);

        let mut short = [0u8; 16];
        assert!(!rd.read_block(0, &mut short));
        assert!(!rd.write_block(0, &short));

        let mut ok = [0u8; 512];
        assert!(!rd.read_block(2, &mut ok));
        assert!(!rd.write_block(2, &ok));
        assert!(!rd.read_block(usize::MAX, &mut ok));

        assert_eq!(rd.sectors_read(), 0);
        assert_eq!(rd.sectors_written(), 0);
    }

    #[test]
    fn test_find_registered_block_driver() {
        init_sync_arch_ops();
        register_block_driver(RamDisk::new(4, 512, 77));
        let found = find_block_driver("ramdisk_77").expect("registered disk");
        assert_eq!(found.total_blocks(), 4);
        assert_eq!(found.device_type(), DeviceType::Block);
        assert!(find_block_driver("ramdisk_78").is_none());
    }
}
