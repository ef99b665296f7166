//! 文件相关操作的 Mock 实现
//!
//! 注意：这里不直接依赖 `vm` crate（避免循环依赖）。
//! `vm` crate 在 `cfg(test)` 下为 [`MockFile`] 实现 `MmFile`。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::vec::Vec;

/// 内存中的文件
///
/// `reopen` 得到的句柄共享同一份数据、写日志和打开计数，但拥有独立的读写位置。
/// 与内核文件系统一致，写入不会扩展文件长度。
pub struct MockFile {
    data: Arc<Mutex<Vec<u8>>>,
    writes: Arc<Mutex<Vec<(usize, usize)>>>,
    open_handles: Arc<AtomicUsize>,
    pos: AtomicUsize,
    closed: AtomicBool,
}

impl MockFile {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(bytes)),
            writes: Arc::new(Mutex::new(Vec::new())),
            open_handles: Arc::new(AtomicUsize::new(1)),
            pos: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let data = self.data.lock().unwrap();
        if offset >= data.len() {
            return 0;
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        n
    }

    pub fn write_at(&self, offset: usize, buf: &[u8]) -> usize {
        let mut data = self.data.lock().unwrap();
        if offset >= data.len() {
            return 0;
        }
        let n = buf.len().min(data.len() - offset);
        data[offset..offset + n].copy_from_slice(&buf[..n]);
        self.writes.lock().unwrap().push((offset, n));
        n
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn seek(&self, pos: usize) {
        self.pos.store(pos, Ordering::SeqCst);
    }

    pub fn tell(&self) -> usize {
        self.pos.load(Ordering::SeqCst)
    }

    pub fn read(&self, buf: &mut [u8]) -> usize {
        let n = self.read_at(self.tell(), buf);
        self.pos.fetch_add(n, Ordering::SeqCst);
        n
    }

    pub fn write(&self, buf: &[u8]) -> usize {
        let n = self.write_at(self.tell(), buf);
        self.pos.fetch_add(n, Ordering::SeqCst);
        n
    }

    /// 打开同一文件的新句柄
    pub fn reopen(&self) -> MockFile {
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Self {
            data: self.data.clone(),
            writes: self.writes.clone(),
            open_handles: self.open_handles.clone(),
            pos: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 仍未关闭的句柄数（包括自身）
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    /// 所有 `write_at` 调用的 (offset, len)
    pub fn write_log(&self) -> Vec<(usize, usize)> {
        self.writes.lock().unwrap().clone()
    }
}
