//! 虚拟内存错误类型

use core::fmt;

use uapi::errno::*;

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 帧或交换槽耗尽
    ResourceExhausted,
    /// 内部状态不一致
    Consistency,
    /// 调用者给出的地址、描述符或映射非法
    InvalidInput,
    /// 块设备或文件 I/O 失败
    Io,
}

/// 虚拟内存操作错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// 没有可用的物理帧，且所有帧都被钉住
    OutOfFrames,
    /// 交换区没有空闲槽
    SwapFull,
    /// 补充页表中没有该页
    NoSuchPage,
    /// 该页已经有硬件映射
    AlreadyMapped,
    /// 帧表中找不到该物理帧
    FrameNotTracked,
    /// 交换槽未被占用
    SlotNotInUse,
    /// 内容已换回内存的交换项被再次装载
    StaleSwapEntry,
    /// 硬件页表拒绝建立映射
    MapFailed,
    /// 非法用户地址
    BadAddress,
    /// 对已映射页的访问仍然触发缺页（例如写只读页）
    ProtectionFault,
    /// 地址未按页对齐
    Misaligned,
    /// 非法文件描述符
    BadFileDescriptor,
    /// 长度为 0 的文件不能映射
    EmptyFile,
    /// 映射范围与已有页重叠
    Overlap,
    /// 未知的映射 ID
    UnknownMapping,
    /// 找不到交换设备
    NoSwapDevice,
    /// 交换设备的块大小不能整除页大小
    UnsupportedBlockSize,
    /// 块设备传输失败
    DeviceIo,
    /// 文件读取不足
    ShortRead,
    /// 文件写入不足
    ShortWrite,
    /// 文件系统返回的错误码
    File(isize),
}

impl VmError {
    /// 错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            VmError::OutOfFrames | VmError::SwapFull => ErrorKind::ResourceExhausted,
            VmError::NoSuchPage
            | VmError::AlreadyMapped
            | VmError::FrameNotTracked
            | VmError::SlotNotInUse
            | VmError::StaleSwapEntry
            | VmError::MapFailed => ErrorKind::Consistency,
            VmError::BadAddress
            | VmError::ProtectionFault
            | VmError::Misaligned
            | VmError::BadFileDescriptor
            | VmError::EmptyFile
            | VmError::Overlap
            | VmError::UnknownMapping
            | VmError::NoSwapDevice
            | VmError::UnsupportedBlockSize => ErrorKind::InvalidInput,
            VmError::DeviceIo | VmError::ShortRead | VmError::ShortWrite | VmError::File(_) => {
                ErrorKind::Io
            }
        }
    }

    /// 转换为系统调用错误码（负值）
    pub fn to_errno(&self) -> isize {
        match self {
            VmError::OutOfFrames => -ENOMEM,
            VmError::SwapFull => -ENOSPC,
            VmError::BadAddress | VmError::ProtectionFault => -EFAULT,
            VmError::Misaligned | VmError::EmptyFile | VmError::UnsupportedBlockSize => -EINVAL,
            VmError::BadFileDescriptor => -EBADF,
            VmError::Overlap | VmError::AlreadyMapped => -EEXIST,
            VmError::UnknownMapping | VmError::NoSuchPage => -EINVAL,
            VmError::NoSwapDevice => -ENODEV,
            VmError::File(errno) => {
                if *errno < 0 {
                    *errno
                } else {
                    -*errno
                }
            }
            VmError::FrameNotTracked
            | VmError::SlotNotInUse
            | VmError::StaleSwapEntry
            | VmError::MapFailed
            | VmError::DeviceIo
            | VmError::ShortRead
            | VmError::ShortWrite => -EIO,
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::OutOfFrames => write!(f, "out of user frames"),
            VmError::SwapFull => write!(f, "swap space exhausted"),
            VmError::NoSuchPage => write!(f, "page not in supplemental page table"),
            VmError::AlreadyMapped => write!(f, "page already mapped"),
            VmError::FrameNotTracked => write!(f, "frame not tracked by frame table"),
            VmError::SlotNotInUse => write!(f, "swap slot not in use"),
            VmError::StaleSwapEntry => write!(f, "swap entry already swapped in"),
            VmError::MapFailed => write!(f, "page table refused mapping"),
            VmError::BadAddress => write!(f, "invalid user address"),
            VmError::ProtectionFault => write!(f, "fault on mapped page"),
            VmError::Misaligned => write!(f, "address not page aligned"),
            VmError::BadFileDescriptor => write!(f, "bad file descriptor"),
            VmError::EmptyFile => write!(f, "cannot map empty file"),
            VmError::Overlap => write!(f, "mapping overlaps existing pages"),
            VmError::UnknownMapping => write!(f, "unknown mapping id"),
            VmError::NoSwapDevice => write!(f, "swap device not found"),
            VmError::UnsupportedBlockSize => write!(f, "unsupported swap block size"),
            VmError::DeviceIo => write!(f, "block device I/O error"),
            VmError::ShortRead => write!(f, "short file read"),
            VmError::ShortWrite => write!(f, "short file write"),
            VmError::File(errno) => write!(f, "file error {}", errno),
        }
    }
}

/// 虚拟内存操作结果
pub type VmResult<T> = Result<T, VmError>;
