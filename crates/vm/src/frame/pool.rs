//! 帧槽环与时钟指针
//!
//! 槽数固定为帧上限。每个槽处于以下状态之一：
//!
//! - `Free`：没有物理帧
//! - `Resident`：帧已装入某个用户页
//! - `Evicting`：帧被选为牺牲页，内容正在写往交换区
//! - `Reserved`：帧已腾空，等待分配者装入新页
//!
//! 后两种状态不会被再次选中，也不能被钉住。

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::address::{Paddr, Vaddr};
use crate::process::ProcessVm;

/// 帧表记录
pub(crate) struct Frame {
    pub(crate) paddr: Paddr,
    pub(crate) upage: Vaddr,
    pub(crate) owner: Arc<ProcessVm>,
    pub(crate) pin_count: usize,
}

pub(crate) enum Slot {
    Free,
    Resident(Frame),
    Evicting(Frame),
    Reserved(Paddr),
}

pub(crate) struct FramePool {
    slots: Vec<Slot>,
    hand: usize,
    index: BTreeMap<Paddr, usize>,
}

impl FramePool {
    pub(crate) fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot::Free);
        Self {
            slots,
            hand: 0,
            index: BTreeMap::new(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| matches!(s, Slot::Free))
    }

    pub(crate) fn install(&mut self, idx: usize, frame: Frame) {
        debug_assert!(matches!(self.slots[idx], Slot::Free | Slot::Reserved(_)));
        self.index.insert(frame.paddr, idx);
        self.slots[idx] = Slot::Resident(frame);
    }

    pub(crate) fn slot_of(&self, paddr: Paddr) -> Option<usize> {
        self.index.get(&paddr).copied()
    }

    pub(crate) fn slot_mut(&mut self, idx: usize) -> &mut Slot {
        &mut self.slots[idx]
    }

    pub(crate) fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    /// 移除 `idx` 处的记录，返回原状态
    pub(crate) fn take(&mut self, idx: usize) -> Slot {
        let slot = core::mem::replace(&mut self.slots[idx], Slot::Free);
        match &slot {
            Slot::Resident(f) | Slot::Evicting(f) => {
                self.index.remove(&f.paddr);
            }
            Slot::Reserved(paddr) => {
                self.index.remove(paddr);
            }
            Slot::Free => {}
        }
        slot
    }

    /// 二次机会选择牺牲帧
    ///
    /// 从时钟指针开始扫描：跳过被钉住的帧；accessed 位为 1 的帧清零后跳过；
    /// 遇到第一个 accessed 为 0 的未钉住帧即选中。
    /// 第一圈清掉了所有经过帧的 accessed 位，因此两圈之内必有结果，
    /// 除非所有帧都被钉住或不处于驻留状态。
    pub(crate) fn select_victim(&mut self) -> Option<usize> {
        let n = self.slots.len();
        for _ in 0..2 * n {
            let idx = self.hand;
            self.hand = (self.hand + 1) % n;
            let Slot::Resident(frame) = &self.slots[idx] else {
                continue;
            };
            if frame.pin_count > 0 {
                continue;
            }
            let pt = frame.owner.page_table();
            if pt.is_accessed(frame.upage) {
                pt.set_accessed(frame.upage, false);
                continue;
            }
            return Some(idx);
        }
        None
    }

    /// `Resident` → `Evicting`
    pub(crate) fn begin_eviction(&mut self, idx: usize) -> (Paddr, Vaddr, Arc<ProcessVm>) {
        match core::mem::replace(&mut self.slots[idx], Slot::Free) {
            Slot::Resident(frame) => {
                let info = (frame.paddr, frame.upage, frame.owner.clone());
                self.slots[idx] = Slot::Evicting(frame);
                info
            }
            _ => unreachable!("victim slot {} is not resident", idx),
        }
    }

    /// `Evicting` → `Reserved`，释放对原所属进程的引用
    pub(crate) fn finish_eviction(&mut self, idx: usize) -> Option<Arc<ProcessVm>> {
        match core::mem::replace(&mut self.slots[idx], Slot::Free) {
            Slot::Evicting(frame) => {
                self.slots[idx] = Slot::Reserved(frame.paddr);
                Some(frame.owner)
            }
            other => {
                self.slots[idx] = other;
                None
            }
        }
    }

    /// 换出失败，`Evicting` → `Resident`
    pub(crate) fn abort_eviction(&mut self, idx: usize) {
        if let Slot::Evicting(frame) = core::mem::replace(&mut self.slots[idx], Slot::Free) {
            self.slots[idx] = Slot::Resident(frame);
        }
    }
}
