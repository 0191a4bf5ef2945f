//! 扩展：从选中节点生成候选延续
//!
//! 单个候选的流水线：流式生成 → 标记解析（逐 Token 发事件）→ 内嵌检索指令则
//! 同步调用工具并把结果附在候选上。模型调用退避重试一次，再失败丢弃该候选。
//! 候选 NodeId 预先分配，node_enter 先于该节点的任何 token 事件；
//! 取消或失败的半成品不会入树。

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::core::EngineError;
use crate::llm::{LlmClient, Message};
use crate::mcts::events::{send_event, EngineEvent, EventSender};
use crate::mcts::markers::{MarkerEvent, MarkerParser};
use crate::tools::{DepthTier, SearchResult, ToolInvoker};
use crate::tree::{NodeId, Tree};

/// 重试前的退避
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// 生成完毕、尚未入树的候选
pub struct CandidateDraft {
    pub id: NodeId,
    pub content: String,
    pub tool_results: Vec<SearchResult>,
}

pub struct Expander {
    llm: Arc<dyn LlmClient>,
    invoker: Arc<ToolInvoker>,
    temperature: f32,
    timeout: Duration,
}

/// 根→节点的轨迹渲染为模型消息：根是问题框架（user），其余步骤为 assistant；
/// 带检索结果的节点之后注入一条结果通告，供后续步骤使用
pub fn trajectory_messages(tree: &Tree, node_id: NodeId, system: &str) -> Vec<Message> {
    let mut msgs = vec![Message::system(system)];
    for (i, id) in tree.path_to_root(node_id).into_iter().enumerate() {
        let node = match tree.get(id) {
            Some(n) => n,
            None => continue,
        };
        if i == 0 {
            msgs.push(Message::user(node.content.clone()));
        } else {
            msgs.push(Message::assistant(node.content.clone()));
        }
        for r in &node.tool_results {
            msgs.push(Message::user(format!(
                "System Notification: [Search Results]\n{}\n\nPlease continue reasoning.",
                r.as_context_block()
            )));
        }
    }
    msgs
}

/// 根→节点的轨迹拼接为纯文本（反思与评估用）
pub fn trajectory_text(tree: &Tree, node_id: NodeId) -> String {
    tree.path_to_root(node_id)
        .into_iter()
        .filter_map(|id| tree.get(id))
        .map(|n| n.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

impl Expander {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        invoker: Arc<ToolInvoker>,
        temperature: f32,
        timeout_secs: u64,
    ) -> Self {
        Self {
            llm,
            invoker,
            temperature,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 生成一个候选：流式消费、解析标记、执行内嵌检索。
    /// 失败重试一次后返回 ModelUnavailable，由调用方丢弃该候选。
    pub async fn generate_candidate(
        &self,
        messages: &[Message],
        depth: usize,
        tier: DepthTier,
        events: &Option<EventSender>,
        cancel: &CancellationToken,
    ) -> Result<CandidateDraft, EngineError> {
        let id = NodeId::new();
        send_event(
            events,
            EngineEvent::NodeEnter {
                node_id: id.to_string(),
                depth,
            },
        );

        let mut last_err = String::new();
        for attempt in 0..2 {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            match self.stream_once(messages, id, events).await {
                Ok((content, search_query)) => {
                    let mut tool_results = Vec::new();
                    if let Some(query) = search_query {
                        let result = self.invoker.search(&query, tier).await;
                        send_event(
                            events,
                            EngineEvent::ToolIo {
                                query,
                                provider: result.provider.clone(),
                                result_count: result.hits.len(),
                            },
                        );
                        tool_results.push(result);
                    }
                    return Ok(CandidateDraft {
                        id,
                        content,
                        tool_results,
                    });
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "candidate generation failed");
                    last_err = e;
                    if attempt == 0 {
                        sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }

        send_event(
            events,
            EngineEvent::Error {
                text: format!("candidate dropped: {}", last_err),
            },
        );
        Err(EngineError::ModelUnavailable(last_err))
    }

    /// 单次流式生成：返回（含标记的原始内容，可选检索指令）
    async fn stream_once(
        &self,
        messages: &[Message],
        node_id: NodeId,
        events: &Option<EventSender>,
    ) -> Result<(String, Option<String>), String> {
        timeout(self.timeout, async {
            let mut stream = self.llm.complete_stream(messages, self.temperature).await?;

            let mut parser = MarkerParser::new();
            let mut content = String::new();
            let mut search_query = None;

            while let Some(item) = stream.next().await {
                let tok = item?;
                content.push_str(&tok);
                for ev in parser.feed(&tok) {
                    handle_marker_event(ev, node_id, events, &mut search_query);
                }
            }
            for ev in parser.finish() {
                handle_marker_event(ev, node_id, events, &mut search_query);
            }

            Ok((content, search_query))
        })
        .await
        .map_err(|_| "model call timed out".to_string())?
    }
}

fn handle_marker_event(
    ev: MarkerEvent,
    node_id: NodeId,
    events: &Option<EventSender>,
    search_query: &mut Option<String>,
) {
    match ev {
        MarkerEvent::Text(t) | MarkerEvent::Deliberation(t) => {
            send_event(
                events,
                EngineEvent::Token {
                    node_id: node_id.to_string(),
                    text: t,
                },
            );
        }
        MarkerEvent::SearchQuery(q) => {
            // 一个候选只执行第一条指令
            if search_query.is_none() {
                *search_query = Some(q);
            }
        }
    }
}
