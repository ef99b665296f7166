//! 文件接口 trait 定义

use alloc::sync::Arc;

/// 可被惰性装载、映射到内存或经系统调用读写的文件
///
/// 此 trait 抽象了文件系统需要提供的最小接口。
/// 按偏移读写（`read_at`/`write_at`）不改变文件位置，
/// 虚拟内存内部只用这两个方法；带位置的接口供 `read`/`write` 系统调用使用。
pub trait MmFile: Send + Sync {
    /// 从指定偏移读取数据到缓冲区
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize>;

    /// 将缓冲区数据写入指定偏移，不会扩展文件
    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize>;

    /// 从当前位置读取并推进位置
    fn read(&self, buf: &mut [u8]) -> Result<usize, isize>;

    /// 向当前位置写入并推进位置
    fn write(&self, buf: &[u8]) -> Result<usize, isize>;

    /// 设置当前位置
    fn seek(&self, pos: usize);

    /// 文件长度
    fn len(&self) -> usize;

    /// 文件是否为空
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 打开同一文件的独立句柄
    ///
    /// 映射持有自己的句柄，用户关闭原描述符不影响映射。
    fn reopen(&self) -> Result<Arc<dyn MmFile>, isize>;

    /// 关闭句柄
    fn close(&self);
}
