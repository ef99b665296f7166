//! 内核设备驱动框架（块设备部分）
//!
//! - [`Driver`] trait - 设备驱动基础接口
//! - [`BlockDriver`] trait - 块设备驱动接口（按扇区读写）
//! - [`RamDisk`] - 内存模拟的块设备，用于测试和无盘启动
//!
//! 块设备通过 [`register_block_driver`] 登记到全局列表 [`BLK_DRIVERS`]，
//! 其它子系统（例如交换区）按设备 ID 查找。

#![no_std]
#![allow(clippy::module_inception)]

extern crate alloc;

pub mod block;
pub mod driver;

pub use block::{BLK_DRIVERS, BlockDriver, RamDisk, find_block_driver, register_block_driver};
pub use driver::{DeviceType, Driver};
