//! 块设备模块
//!
//! 块设备以固定大小的扇区为单位读写，扇区号从 0 开始连续编号。

mod ram_disk;

use alloc::{sync::Arc, vec::Vec};
use lazy_static::lazy_static;
use sync::SpinLock;

use crate::driver::Driver;

pub use ram_disk::RamDisk;

lazy_static! {
    /// 全局块设备驱动列表
    pub static ref BLK_DRIVERS: SpinLock<Vec<Arc<dyn BlockDriver>>> = SpinLock::new(Vec::new());
}

/// 块设备驱动程序接口
pub trait BlockDriver: Driver {
    /// 读取一个扇区
    /// # 参数：
    /// * `block_id` - 扇区号
    /// * `buf` - 长度必须等于 [`BlockDriver::block_size`]
    /// # 返回值：
    /// 如果读取成功则返回 true，否则返回 false
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> bool;

    /// 写入一个扇区
    /// # 参数：
    /// * `block_id` - 扇区号
    /// * `buf` - 长度必须等于 [`BlockDriver::block_size`]
    /// # 返回值：
    /// 如果写入成功则返回 true，否则返回 false
    fn write_block(&self, block_id: usize, buf: &[u8]) -> bool;

    /// 扇区大小（字节）
    fn block_size(&self) -> usize;

    /// 设备总扇区数
    fn total_blocks(&self) -> usize;
}

/// 登记一个块设备
pub fn register_block_driver(driver: Arc<dyn BlockDriver>) {
    log::info!(
        "device: block driver {} registered ({} sectors)",
        driver.get_id(),
        driver.total_blocks()
    );
    BLK_DRIVERS.lock().push(driver);
}

/// 按 [`Driver::get_id`] 查找已登记的块设备
pub fn find_block_driver(id: &str) -> Option<Arc<dyn BlockDriver>> {
    BLK_DRIVERS
        .lock()
        .iter()
        .find(|d| d.get_id() == id)
        .cloned()
}
