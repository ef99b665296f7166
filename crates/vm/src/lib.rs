//! 按需分页的虚拟内存子系统
//!
//! 为用户进程提供惰性装载、栈自动增长、文件映射以及基于交换区的页面置换。
//! 主要组成：
//!
//! - [`FrameTable`]：用户物理帧表，二次机会（时钟）置换与钉住
//! - [`SupplementalPageTable`]：每进程的补充页表，记录每个用户页的内容来源
//! - [`SwapManager`]：交换区槽位位图与页粒度的换入换出
//! - [`VmManager`]：缺页处理、栈增长、`mmap`/`munmap` 与进程生命周期的编排者
//!
//! # 外部依赖
//!
//! 硬件页表、用户物理页分配器和文件均通过 trait 注入：
//! [`AddressSpace`]、[`PhysPageAllocator`]、[`MmFile`]。
//! 交换设备来自 `device` crate 的 [`BlockDriver`](device::BlockDriver)。
//!
//! # 锁顺序
//!
//! 帧表锁只保护帧表本身，持有期间不获取任何其它锁，也不做设备 I/O。
//! 换出牺牲页时依次持有"牺牲页所属进程的补充页表锁 → 交换区锁"。

#![no_std]

extern crate alloc;

mod address;
mod address_space;
mod config;
mod error;
mod fault;
mod fd_table;
mod file;
mod frame;
mod manager;
mod mmap;
mod page;
mod phys;
mod process;
mod swap;
pub mod syscall;
mod uaccess;

pub use address::*;
pub use address_space::*;
pub use config::*;
pub use error::*;
pub use fd_table::FdTable;
pub use file::MmFile;
pub use frame::{FrameStats, FrameTable, PinGuard};
pub use manager::VmManager;
pub use mmap::{MmapRegion, MmapTable};
pub use page::{FileBacking, PageBacking, PageEntry, SupplementalPageTable};
pub use phys::PhysPageAllocator;
pub use process::{Pid, ProcessVm};
pub use swap::{SwapManager, SwapSlot, SwapStats};

#[cfg(test)]
mod tests;
