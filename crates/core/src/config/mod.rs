//! 应用配置
//!
//! 配置按 默认值 → TOML 文件 → `ORCHESTRA_` 环境变量 的顺序叠加，
//! 加载完成后统一校验。

pub mod models;

pub use models::*;

#[cfg(test)]
mod tests;
