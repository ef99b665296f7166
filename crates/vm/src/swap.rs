//! 交换区管理
//!
//! 交换设备被划分为页大小的槽，每个槽占 `页大小 / 块大小` 个连续扇区。
//! 槽的占用状态用位图跟踪：
//!
//! - **bitmap**：每个 bit 表示一个槽（0=空闲，1=已占用）
//! - 分配总是返回编号最小的空闲槽，利用 `trailing_zeros` 跳过整字
//!
//! 换入成功后槽立即释放，槽中的内容不再有效。
//! 整个传输过程持有交换区锁，它是 [`SpinMutex`]，不会关闭中断。

use alloc::sync::Arc;
use alloc::vec::Vec;

use device::{BlockDriver, find_block_driver};
use sync::SpinMutex;

use crate::config::PAGE_SIZE;
use crate::error::{VmError, VmResult};

/// 交换槽编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapSlot(usize);

impl SwapSlot {
    /// 由槽编号构造
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// 槽编号
    pub const fn index(&self) -> usize {
        self.0
    }
}

/// 交换区使用统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapStats {
    /// 槽总数
    pub total: usize,
    /// 已占用槽数
    pub used: usize,
}

/// 槽占用位图
struct SlotBitmap {
    bitmap: Vec<u64>,
    total: usize,
    used: usize,
}

impl SlotBitmap {
    fn new(total: usize) -> Self {
        Self {
            bitmap: alloc::vec![0u64; total.div_ceil(64)],
            total,
            used: 0,
        }
    }

    fn is_free(&self, idx: usize) -> bool {
        let word_idx = idx / 64;
        let bit_idx = idx % 64;
        (self.bitmap[word_idx] & (1u64 << bit_idx)) == 0
    }

    fn mark_allocated(&mut self, idx: usize) {
        let word_idx = idx / 64;
        let bit_idx = idx % 64;
        self.bitmap[word_idx] |= 1u64 << bit_idx;
        self.used += 1;
    }

    fn mark_free(&mut self, idx: usize) {
        let word_idx = idx / 64;
        let bit_idx = idx % 64;
        self.bitmap[word_idx] &= !(1u64 << bit_idx);
        self.used -= 1;
    }

    /// 编号最小的空闲槽
    fn lowest_free(&self) -> Option<usize> {
        for (word_idx, &word) in self.bitmap.iter().enumerate() {
            // 快速跳过全满的 u64
            if word == u64::MAX {
                continue;
            }
            let idx = word_idx * 64 + (!word).trailing_zeros() as usize;
            // 最后一个字中超出 total 的位永远不可用
            return (idx < self.total).then_some(idx);
        }
        None
    }
}

struct SwapInner {
    device: Arc<dyn BlockDriver>,
    sectors_per_slot: usize,
    slots: SlotBitmap,
}

impl SwapInner {
    fn first_sector(&self, slot: usize) -> usize {
        slot * self.sectors_per_slot
    }

    fn write_slot(&self, slot: usize, page: &[u8]) -> bool {
        let block_size = self.device.block_size();
        let base = self.first_sector(slot);
        page.chunks_exact(block_size)
            .enumerate()
            .all(|(i, sector)| self.device.write_block(base + i, sector))
    }

    fn read_slot(&self, slot: usize, page: &mut [u8]) -> bool {
        let block_size = self.device.block_size();
        let base = self.first_sector(slot);
        page.chunks_exact_mut(block_size)
            .enumerate()
            .all(|(i, sector)| self.device.read_block(base + i, sector))
    }
}

/// 交换区管理器
pub struct SwapManager {
    inner: SpinMutex<SwapInner>,
}

impl SwapManager {
    /// 在给定块设备上建立交换区，所有槽初始为空闲
    ///
    /// 槽数为 `设备扇区数 / 每槽扇区数`，尾部不足一页的扇区不使用。
    pub fn new(device: Arc<dyn BlockDriver>) -> VmResult<Self> {
        let block_size = device.block_size();
        if block_size == 0 || PAGE_SIZE % block_size != 0 {
            log::error!("swap: block size {} does not divide page size", block_size);
            return Err(VmError::UnsupportedBlockSize);
        }
        let sectors_per_slot = PAGE_SIZE / block_size;
        let total = device.total_blocks() / sectors_per_slot;
        log::info!(
            "swap: {} slots on {} ({} sectors per slot)",
            total,
            device.get_id(),
            sectors_per_slot
        );
        Ok(Self {
            inner: SpinMutex::new(SwapInner {
                device,
                sectors_per_slot,
                slots: SlotBitmap::new(total),
            }),
        })
    }

    /// 按设备标识在已注册的块设备中查找交换设备
    pub fn attach(device_id: &str) -> VmResult<Self> {
        let device = find_block_driver(device_id).ok_or_else(|| {
            log::error!("swap: no block device named {}", device_id);
            VmError::NoSwapDevice
        })?;
        Self::new(device)
    }

    /// 将一页内容写入编号最小的空闲槽
    ///
    /// 传输失败时槽被释放并返回 [`VmError::DeviceIo`]。
    pub fn write_out(&self, page: &[u8]) -> VmResult<SwapSlot> {
        debug_assert_eq!(page.len(), PAGE_SIZE);
        let mut inner = self.inner.lock();
        let Some(slot) = inner.slots.lowest_free() else {
            log::warn!("swap: no free slot");
            return Err(VmError::SwapFull);
        };
        inner.slots.mark_allocated(slot);
        if !inner.write_slot(slot, page) {
            inner.slots.mark_free(slot);
            log::error!("swap: write to slot {} failed", slot);
            return Err(VmError::DeviceIo);
        }
        log::debug!("swap: wrote slot {}", slot);
        Ok(SwapSlot(slot))
    }

    /// 将槽中的内容读入 `dest` 并释放该槽
    ///
    /// 槽未被占用时返回 [`VmError::SlotNotInUse`]；传输失败时槽保持占用。
    pub fn read_in(&self, slot: SwapSlot, dest: &mut [u8]) -> VmResult<()> {
        debug_assert_eq!(dest.len(), PAGE_SIZE);
        let mut inner = self.inner.lock();
        if slot.0 >= inner.slots.total || inner.slots.is_free(slot.0) {
            log::error!("swap: read from unused slot {}", slot.0);
            return Err(VmError::SlotNotInUse);
        }
        if !inner.read_slot(slot.0, dest) {
            log::error!("swap: read from slot {} failed", slot.0);
            return Err(VmError::DeviceIo);
        }
        inner.slots.mark_free(slot.0);
        log::debug!("swap: read slot {}", slot.0);
        Ok(())
    }

    /// 丢弃槽中的内容
    pub fn free(&self, slot: SwapSlot) -> VmResult<()> {
        let mut inner = self.inner.lock();
        if slot.0 >= inner.slots.total || inner.slots.is_free(slot.0) {
            return Err(VmError::SlotNotInUse);
        }
        inner.slots.mark_free(slot.0);
        Ok(())
    }

    /// 槽是否被占用
    pub fn is_used(&self, slot: SwapSlot) -> bool {
        let inner = self.inner.lock();
        slot.0 < inner.slots.total && !inner.slots.is_free(slot.0)
    }

    /// 使用统计
    pub fn stats(&self) -> SwapStats {
        let inner = self.inner.lock();
        SwapStats {
            total: inner.slots.total,
            used: inner.slots.used,
        }
    }
}
