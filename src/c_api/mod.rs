//! C API 兼容层
//!
//! 提供与 xv6 `bio.c` 兼容的函数接口。
//!
//! 这些函数仅保留 C 风格的命名（`b*`），内部实现全部使用 Rust 风格的方法。

pub mod bio;
