//! 引擎错误类型
//!
//! 原则：搜索过程中的任何单点失败都不允许中断整个查询。
//! ModelUnavailable 退避重试一次后丢弃该候选；ToolUnavailable 降级为空结果；
//! MalformedScore 记 0 分继续；EmptyTree / BudgetExhausted 是正常终止条件而非故障。

use thiserror::Error;

/// 搜索引擎运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum EngineError {
    /// 模型后端不可达或超时（重试一次后丢弃当前候选）
    #[error("Model backend unavailable: {0}")]
    ModelUnavailable(String),

    /// 检索提供方不可达（降级为空结果，不致命）
    #[error("Search tool unavailable: {0}")]
    ToolUnavailable(String),

    /// 评分输出无法解析（记 0 分，不致命）
    #[error("Malformed score output: {0}")]
    MalformedScore(String),

    /// 树中已无可扩展节点（以当前最优节点终止）
    #[error("No expandable node left in tree")]
    EmptyTree,

    /// 搜索预算耗尽（预期的终止条件）
    #[error("Search budget exhausted")]
    BudgetExhausted,

    /// 调用方取消
    #[error("Cancelled by caller")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),
}
