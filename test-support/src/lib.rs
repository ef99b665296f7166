//! 测试支持 crate
//!
//! 提供各 crate 单元测试共用的 Mock 实现。
//! 只在宿主机 `cargo test` 下使用，因此直接依赖 std。

pub mod mock;
