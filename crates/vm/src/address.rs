//! 地址类型
//!
//! - [`Vaddr`]：用户虚拟地址
//! - [`Paddr`]：物理地址
//!
//! 两者都实现 [`UsizeConvert`] 与 [`AlignOps`]，补充页表以页对齐的 [`Vaddr`] 为键。

use core::fmt;
use core::ops::Add;

use crate::config::PAGE_SIZE;

/// 与 usize 之间的转换
pub trait UsizeConvert: Copy {
    /// 转换为 usize
    fn as_usize(&self) -> usize;
    /// 从 usize 构造
    fn from_usize(value: usize) -> Self;
}

/// 页对齐操作
pub trait AlignOps: UsizeConvert {
    /// 页内偏移
    fn page_offset(&self) -> usize {
        self.as_usize() % PAGE_SIZE
    }

    /// 是否按页对齐
    fn is_page_aligned(&self) -> bool {
        self.page_offset() == 0
    }

    /// 向下对齐到页边界
    fn align_down_to_page(&self) -> Self {
        Self::from_usize(self.as_usize() & !(PAGE_SIZE - 1))
    }
}

macro_rules! impl_address {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[repr(transparent)]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(usize);

        impl $name {
            /// 构造地址
            pub const fn new(value: usize) -> Self {
                Self(value)
            }
        }

        impl UsizeConvert for $name {
            fn as_usize(&self) -> usize {
                self.0
            }

            fn from_usize(value: usize) -> Self {
                Self(value)
            }
        }

        impl AlignOps for $name {}

        impl Add<usize> for $name {
            type Output = Self;

            fn add(self, rhs: usize) -> Self {
                Self(self.0 + rhs)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:#x})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }
    };
}

impl_address!(Vaddr, "用户虚拟地址");
impl_address!(Paddr, "物理地址");

impl Vaddr {
    /// 同一页内、按页对齐的起始地址
    pub fn page(&self) -> Vaddr {
        self.align_down_to_page()
    }

    /// 第 `n` 个后续页
    pub fn nth_page(&self, n: usize) -> Option<Vaddr> {
        let offset = n.checked_mul(PAGE_SIZE)?;
        self.0.checked_add(offset).map(Vaddr)
    }
}
