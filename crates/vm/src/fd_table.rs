//! 文件描述符表
//!
//! 约定：
//!
//! - 0/1 保留给控制台，可以通过 [`FdTable::install_console`] 放入控制台对象，
//!   但永远不能被映射
//! - `alloc()` 从 2 开始分配最小可用的描述符

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use sync::SpinLock;
use uapi::mm::{FIRST_FILE_FD, STDIN_FILENO, STDOUT_FILENO};

use crate::error::{VmError, VmResult};
use crate::file::MmFile;

/// 文件描述符表
pub struct FdTable {
    files: SpinLock<Vec<Option<Arc<dyn MmFile>>>>,
}

impl fmt::Debug for FdTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let files = self.files.lock();
        let used = files.iter().filter(|slot| slot.is_some()).count();
        f.debug_struct("FdTable")
            .field("slots", &files.len())
            .field("used", &used)
            .finish()
    }
}

impl FdTable {
    /// 创建新的文件描述符表
    pub fn new() -> Self {
        let mut files = Vec::new();
        files.resize_with(FIRST_FILE_FD, || None);
        Self {
            files: SpinLock::new(files),
        }
    }

    /// 放入标准输入和标准输出
    pub fn install_console(&self, stdin: Arc<dyn MmFile>, stdout: Arc<dyn MmFile>) {
        let mut files = self.files.lock();
        files[STDIN_FILENO] = Some(stdin);
        files[STDOUT_FILENO] = Some(stdout);
    }

    /// 分配最小可用的描述符
    pub fn alloc(&self, file: Arc<dyn MmFile>) -> usize {
        let mut files = self.files.lock();
        if let Some(fd) = files
            .iter()
            .skip(FIRST_FILE_FD)
            .position(|slot| slot.is_none())
            .map(|i| i + FIRST_FILE_FD)
        {
            files[fd] = Some(file);
            return fd;
        }
        files.push(Some(file));
        files.len() - 1
    }

    /// 获取描述符对应的文件
    pub fn get(&self, fd: usize) -> VmResult<Arc<dyn MmFile>> {
        self.files
            .lock()
            .get(fd)
            .and_then(|slot| slot.clone())
            .ok_or(VmError::BadFileDescriptor)
    }

    /// 关闭描述符
    pub fn close(&self, fd: usize) -> VmResult<()> {
        let file = {
            let mut files = self.files.lock();
            files
                .get_mut(fd)
                .and_then(|slot| slot.take())
                .ok_or(VmError::BadFileDescriptor)?
        };
        file.close();
        Ok(())
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}
