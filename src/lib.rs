//! Arbor - LLM 树搜索推理引擎
//!
//! 把候选推理延续组织成搜索树，用选择 / 扩展 / 反思评分 / 回传在固定模型上
//! 以推理时计算换取答案质量；内嵌检索指令驱动外部信息回灌。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Ollama / Mock）
//! - **mcts**: 选择、扩展、反思、评估、回传与主循环
//! - **observability**: tracing 初始化
//! - **tools**: 分层网络检索（提供方抽象 + 调用器）
//! - **tree**: 推理树 arena

pub mod config;
pub mod core;
pub mod llm;
pub mod mcts;
pub mod observability;
pub mod tools;
pub mod tree;

pub use mcts::{search_loop, SearchOutcome, SearchSession};
