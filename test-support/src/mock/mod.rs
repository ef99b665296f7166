//! Mock 实现模块
//!
//! 提供各种架构和子系统的 Mock 实现，用于测试。
//! 这里的类型只有固有方法，被测 crate 在 `cfg(test)` 下为它们实现自己的 trait。

pub mod arch;
pub mod fs;
pub mod mm;
