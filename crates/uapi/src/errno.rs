//! 错误码
//!
//! 与 Linux 保持一致的正值 errno，系统调用返回时取负。

pub const EIO: isize = 5;
pub const EBADF: isize = 9;
pub const ENOMEM: isize = 12;
pub const EFAULT: isize = 14;
pub const EEXIST: isize = 17;
pub const ENODEV: isize = 19;
pub const EINVAL: isize = 22;
pub const ENOSPC: isize = 28;
