//! 虚拟内存相关的系统调用
//!
//! 每个系统调用返回 [`SyscallResult`]：`Ok` 中是交给用户态的返回值
//! （映射 ID、字节数，或失败时的 `-1`），`Err` 表示进程必须被终止，
//! 由调度器负责实际的终止动作。

use alloc::sync::Arc;

use uapi::mm::{MAP_FAILED, MapId, STDIN_FILENO, STDOUT_FILENO};

use crate::error::VmError;
use crate::fd_table::FdTable;
use crate::manager::VmManager;
use crate::process::ProcessVm;

/// 必须终止进程的系统调用错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// 终止进程，附带原因
    Terminate(VmError),
}

impl From<VmError> for SyscallError {
    fn from(e: VmError) -> Self {
        SyscallError::Terminate(e)
    }
}

/// 系统调用结果
pub type SyscallResult = Result<isize, SyscallError>;

/// `mmap(fd, addr)`
///
/// 描述符 0/1 不可映射。所有失败都以 `MAP_FAILED` 返回给用户态。
pub fn sys_mmap(
    vm: &VmManager,
    proc: &Arc<ProcessVm>,
    fds: &FdTable,
    fd: usize,
    addr: usize,
) -> SyscallResult {
    if fd == STDIN_FILENO || fd == STDOUT_FILENO {
        return Ok(MAP_FAILED);
    }
    let Ok(file) = fds.get(fd) else {
        return Ok(MAP_FAILED);
    };
    Ok(vm.mmap(proc, &file, addr).unwrap_or(MAP_FAILED))
}

/// `munmap(id)`
///
/// 未知 ID 终止进程；写回失败以错误码返回。
pub fn sys_munmap(vm: &VmManager, proc: &Arc<ProcessVm>, id: MapId) -> SyscallResult {
    match vm.munmap(proc, id) {
        Ok(()) => Ok(0),
        Err(VmError::UnknownMapping) => Err(SyscallError::Terminate(VmError::UnknownMapping)),
        Err(e) => Ok(e.to_errno()),
    }
}

/// `read(fd, buf, len)`
///
/// 文件内容直接读入被钉住的用户页。从标准输出读取或缓冲区非法时终止进程。
pub fn sys_read(
    vm: &VmManager,
    proc: &Arc<ProcessVm>,
    fds: &FdTable,
    fd: usize,
    uaddr: usize,
    len: usize,
    sp: usize,
) -> SyscallResult {
    if fd == STDOUT_FILENO {
        return Err(SyscallError::Terminate(VmError::BadFileDescriptor));
    }
    let Ok(file) = fds.get(fd) else {
        return Ok(-1);
    };
    let mut io_err = None;
    let n = vm.for_each_user_chunk(proc, uaddr, len, sp, true, |chunk, _| {
        file.read(chunk).or_else(|errno| {
            io_err = Some(errno);
            Ok(0)
        })
    })?;
    match io_err {
        Some(errno) if n == 0 => Ok(VmError::File(errno).to_errno()),
        _ => Ok(n as isize),
    }
}

/// `write(fd, buf, len)`
///
/// 用户页在写入文件期间保持钉住。向标准输入写入或缓冲区非法时终止进程。
pub fn sys_write(
    vm: &VmManager,
    proc: &Arc<ProcessVm>,
    fds: &FdTable,
    fd: usize,
    uaddr: usize,
    len: usize,
    sp: usize,
) -> SyscallResult {
    if fd == STDIN_FILENO {
        return Err(SyscallError::Terminate(VmError::BadFileDescriptor));
    }
    let Ok(file) = fds.get(fd) else {
        return Ok(-1);
    };
    let mut io_err = None;
    let n = vm.for_each_user_chunk(proc, uaddr, len, sp, false, |chunk, _| {
        file.write(chunk).or_else(|errno| {
            io_err = Some(errno);
            Ok(0)
        })
    })?;
    match io_err {
        Some(errno) if n == 0 => Ok(VmError::File(errno).to_errno()),
        _ => Ok(n as isize),
    }
}
