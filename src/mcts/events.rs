//! 搜索过程事件：用于流式/SSE 展示节点进入、Token、工具调用与终止
//!
//! 约定：某节点的 node_enter 一定先于它的任何 token；兄弟节点并发扩展时事件可交错；
//! 消费方应把未知事件类型当作 keep-alive 忽略。

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// 进入一个新节点（开始为它生成内容）
    NodeEnter { node_id: String, depth: usize },
    /// 节点产出的一段增量文本
    Token { node_id: String, text: String },
    /// 执行了一次外部检索
    ToolIo {
        query: String,
        provider: String,
        result_count: usize,
    },
    /// 主循环圈数与剩余预算
    StepUpdate { lap: u32, budget_remaining: u32 },
    /// 节点的自评文本（预览，避免过长）
    Reflection { node_id: String, preview: String },
    /// 节点的综合评分
    Score { node_id: String, value: f64 },
    /// 错误（不中断搜索的那类）
    Error { text: String },
    /// 搜索结束
    Done { final_node_id: String },
}

/// 事件发送端；无消费者时事件被丢弃
pub type EventSender = tokio::sync::mpsc::UnboundedSender<EngineEvent>;

pub(crate) fn send_event(tx: &Option<EventSender>, ev: EngineEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
