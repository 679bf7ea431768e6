//! # MedRec存储模块
//!
//! 负责报告文件在本地文件系统中的存储，以及上传文件的类型与大小校验。

pub mod storage;
pub mod validation;

pub use storage::*;
pub use validation::*;
