//! 设备驱动基础类型
//!
//! 包含 Driver trait 和 DeviceType 枚举。交换区只使用块设备。

use alloc::string::String;

/// 设备类型枚举
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DeviceType {
    /// 块设备
    Block,
}

/// 设备驱动程序特征
pub trait Driver: Send + Sync {
    /// 返回对应的设备类型
    fn device_type(&self) -> DeviceType;

    /// 获取此设备的唯一标识符，每个实例应不同
    fn get_id(&self) -> String;
}
