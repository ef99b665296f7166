//! 内存映射相关的用户态约定

/// mmap 的映射标识
pub type MapId = isize;

/// mmap 失败时返回给用户态的值
pub const MAP_FAILED: MapId = -1;

/// 标准输入，不能被映射
pub const STDIN_FILENO: usize = 0;

/// 标准输出，不能被映射
pub const STDOUT_FILENO: usize = 1;

/// 第一个可分配给普通文件的描述符
pub const FIRST_FILE_FD: usize = 2;
