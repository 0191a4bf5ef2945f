//! 搜索主循环
//!
//! SELECT → EXPAND →（TOOL）→ REFLECT → EVALUATE → BACKPROP → 终止检查，
//! 循环至找到终答或预算耗尽，每圈消耗一单位预算。k 路候选并发走完各自的
//! 生成/检索/反思/评估流水线，全部汇合后才挂树回传。循环顶部与每次新模型
//! 调用前检查取消；取消时半成品一律丢弃。任何单点失败最坏也只是以
//! 当前最优节点收尾（带低置信标注）。

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::EngineError;
use crate::llm::{LlmClient, Message};
use crate::mcts::backprop::backpropagate;
use crate::mcts::evaluator::{Evaluation, Evaluator};
use crate::mcts::events::{send_event, EngineEvent, EventSender};
use crate::mcts::expander::{trajectory_messages, trajectory_text, CandidateDraft, Expander};
use crate::mcts::markers::visible_text;
use crate::mcts::policy::{AdaptiveBranching, BranchingPolicy, DepthPolicy, TieredDepth};
use crate::mcts::prompts::{
    CLASSIFY_SYSTEM_PROMPT, EXPAND_SYSTEM_PROMPT, FAST_ANSWER_SYSTEM_PROMPT, PLAN_SYSTEM_PROMPT,
};
use crate::mcts::reflector::Reflector;
use crate::mcts::selector::Selector;
use crate::tools::ToolInvoker;
use crate::tree::{NodeId, ReasoningNode, Tree};

/// 终答标记（先匹配长的）
const FINAL_ANSWER_MARKERS: &[&str] = &["Final Answer:", "Answer:"];
/// 答案中出现则视为未完结
const INCOMPLETE_MARKERS: &[&str] = &[
    "i need to search",
    "let me find",
    "i should look up",
    "<search>",
    "...",
    "to be continued",
];
/// 短于此长度不算真实答案
const MIN_ANSWER_CHARS: usize = 10;
/// 反思失败重试前的退避
const RETRY_BACKOFF: Duration = Duration::from_millis(500);
/// 反思/错误事件中的预览长度
const PREVIEW_CHARS: usize = 200;

/// 提取终答部分（剥离内部推理后取标记之后的文本）
pub fn extract_final_answer(content: &str) -> Option<String> {
    let visible = visible_text(content);
    for marker in FINAL_ANSWER_MARKERS {
        if let Some(idx) = visible.find(marker) {
            return Some(visible[idx + marker.len()..].trim().to_string());
        }
    }
    None
}

/// 内容是否构成完整终答（标记存在、长度足够、无未完结暗示）
pub fn is_terminal_answer(content: &str) -> bool {
    let answer = match extract_final_answer(content) {
        Some(a) => a,
        None => return false,
    };
    if answer.chars().count() < MIN_ANSWER_CHARS {
        return false;
    }
    let lower = answer.to_lowercase();
    !INCOMPLETE_MARKERS.iter().any(|m| lower.contains(m))
}

/// 搜索结果：终答、轨迹与反思链
#[derive(Debug)]
pub struct SearchOutcome {
    pub final_answer: String,
    pub final_node_id: NodeId,
    /// root→best 各节点内容
    pub trajectory: Vec<String>,
    /// 路径上的反思链（解释/溯源）
    pub reflections: Vec<String>,
    pub laps: u32,
    /// 未找到明确终答、以当前最优节点收尾时为 true
    pub low_confidence: bool,
    pub tree: Tree,
}

/// 搜索会话：持有组件与配置，可复用于多个查询（每个查询独立建树）
pub struct SearchSession {
    llm: Arc<dyn LlmClient>,
    selector: Selector,
    expander: Expander,
    reflector: Reflector,
    evaluator: Evaluator,
    branching: Box<dyn BranchingPolicy>,
    depth_policy: Box<dyn DepthPolicy>,
    search_budget: u32,
    max_depth: usize,
    gamma: f64,
    consistency_samples: usize,
    completeness_threshold: f64,
    fast_path: bool,
    temperature: f32,
    event_tx: Option<EventSender>,
    cancel: CancellationToken,
}

impl SearchSession {
    pub fn new(llm: Arc<dyn LlmClient>, invoker: Arc<ToolInvoker>, cfg: &AppConfig) -> Self {
        let m = &cfg.mcts;
        Self {
            llm: llm.clone(),
            selector: Selector::new(m.exploration),
            expander: Expander::new(
                llm.clone(),
                invoker,
                cfg.llm.temperature,
                cfg.llm.timeouts.stream,
            ),
            reflector: Reflector::new(llm.clone()),
            evaluator: Evaluator::new(llm, m.weights.clone()),
            branching: Box::new(AdaptiveBranching {
                default_k: m.default_branching,
                explore_k: m.explore_branching,
                exploit_k: m.exploit_branching,
                variance_threshold: m.variance_threshold,
                depth_threshold: m.depth_threshold,
            }),
            depth_policy: Box::new(TieredDepth),
            search_budget: m.search_budget,
            max_depth: m.max_depth,
            gamma: m.gamma,
            consistency_samples: m.consistency_samples,
            completeness_threshold: m.completeness_threshold,
            fast_path: m.fast_path,
            temperature: cfg.llm.temperature,
            event_tx: None,
            cancel: CancellationToken::new(),
        }
    }

    /// 设置事件推送通道
    pub fn with_event_tx(mut self, tx: EventSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 设置取消令牌
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// 替换分支策略
    pub fn with_branching(mut self, policy: Box<dyn BranchingPolicy>) -> Self {
        self.branching = policy;
        self
    }

    /// 替换检索深度策略
    pub fn with_depth_policy(mut self, policy: Box<dyn DepthPolicy>) -> Self {
        self.depth_policy = policy;
        self
    }
}

fn preview(text: &str) -> String {
    let p: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        format!("{}...", p)
    } else {
        p
    }
}

/// 反思一次，失败退避重试一次；仍失败返回 None（该候选被丢弃）
async fn reflect_with_retry(
    session: &SearchSession,
    query: &str,
    trajectory: &str,
) -> Option<String> {
    for attempt in 0..2 {
        if session.cancel.is_cancelled() {
            return None;
        }
        match session.reflector.reflect(query, trajectory).await {
            Ok(r) => return Some(r),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "reflection failed");
                if attempt == 0 {
                    sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }
    None
}

/// 规划：生成不超过 5 步的策略计划（失败不致命，退回裸查询）
async fn generate_plan(session: &SearchSession, query: &str) -> Result<String, String> {
    let system = PLAN_SYSTEM_PROMPT.replace(
        "{date}",
        &chrono::Local::now().format("%Y-%m-%d").to_string(),
    );
    let messages = vec![
        Message::system(system),
        Message::user(format!("Question: {}", query)),
    ];
    session.llm.complete(&messages, session.temperature).await
}

/// 快速通道：简单问题直接流式作答，绕过树搜索
async fn try_fast_path(session: &SearchSession, query: &str) -> Option<SearchOutcome> {
    let classify = vec![
        Message::system(CLASSIFY_SYSTEM_PROMPT),
        Message::user(query.to_string()),
    ];
    let verdict = session.llm.complete(&classify, 0.0).await.ok()?;
    if !verdict.trim().to_uppercase().starts_with("SIMPLE") {
        return None;
    }

    tracing::info!("query classified as simple, taking fast path");
    let answer_msgs = vec![
        Message::system(FAST_ANSWER_SYSTEM_PROMPT),
        Message::user(query.to_string()),
    ];
    let answer = session
        .llm
        .complete(&answer_msgs, session.temperature)
        .await
        .ok()?;

    let tree = Tree::new(query, 0, 0);
    let root_id = tree.root_id;
    send_event(
        &session.event_tx,
        EngineEvent::NodeEnter {
            node_id: root_id.to_string(),
            depth: 0,
        },
    );
    send_event(
        &session.event_tx,
        EngineEvent::Token {
            node_id: root_id.to_string(),
            text: answer.clone(),
        },
    );
    send_event(
        &session.event_tx,
        EngineEvent::Done {
            final_node_id: root_id.to_string(),
        },
    );

    Some(SearchOutcome {
        final_answer: answer.trim().to_string(),
        final_node_id: root_id,
        trajectory: vec![query.to_string()],
        reflections: Vec::new(),
        laps: 0,
        low_confidence: false,
        tree,
    })
}

/// 执行一次完整搜索
pub async fn search_loop(
    session: &SearchSession,
    query: &str,
) -> Result<SearchOutcome, EngineError> {
    if session.cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    if session.fast_path {
        if let Some(outcome) = try_fast_path(session, query).await {
            return Ok(outcome);
        }
    }

    // 规划失败退回裸查询，不中断
    let root_content = match generate_plan(session, query).await {
        Ok(plan) if !plan.trim().is_empty() => {
            format!("Objective: {}\n\nStrategic Plan:\n{}", query, plan.trim())
        }
        Ok(_) => query.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "planning failed, seeding root with bare query");
            query.to_string()
        }
    };

    let mut tree = Tree::new(root_content, session.search_budget, session.max_depth);
    send_event(
        &session.event_tx,
        EngineEvent::NodeEnter {
            node_id: tree.root_id.to_string(),
            depth: 0,
        },
    );

    let mut lap: u32 = 0;
    let mut terminal: Option<NodeId> = None;

    loop {
        if session.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if tree.search_budget == 0 {
            tracing::info!(laps = lap, "search budget exhausted");
            break;
        }

        let selected = match session.selector.select(&tree) {
            Ok(id) => id,
            Err(EngineError::EmptyTree) => {
                tracing::info!("no expandable node left, finishing with best known");
                break;
            }
            Err(e) => return Err(e),
        };

        send_event(
            &session.event_tx,
            EngineEvent::StepUpdate {
                lap,
                budget_remaining: tree.search_budget,
            },
        );

        let (k, tier) = {
            let node = match tree.get(selected) {
                Some(n) => n,
                None => break,
            };
            (
                session.branching.branching(&tree, node),
                session.depth_policy.depth_tier(&tree, node, lap),
            )
        };
        let depth = tree.depth(selected) + 1;
        let system = EXPAND_SYSTEM_PROMPT.replace(
            "{date}",
            &chrono::Local::now().format("%Y-%m-%d").to_string(),
        );
        let messages = trajectory_messages(&tree, selected, &system);
        let parent_trajectory = trajectory_text(&tree, selected);

        tracing::debug!(node = %selected, k, tier = %tier, depth, "expanding");

        // k 路候选并发流水线：生成 →（检索）→ 反思 → 评估
        let tasks = (0..k).map(|_| {
            let messages = messages.clone();
            let parent_trajectory = parent_trajectory.clone();
            async move {
                let draft = session
                    .expander
                    .generate_candidate(&messages, depth, tier, &session.event_tx, &session.cancel)
                    .await
                    .ok()?;

                let trajectory = format!("{}\n\n{}", parent_trajectory, draft.content);
                let reflection = reflect_with_retry(session, query, &trajectory).await?;
                send_event(
                    &session.event_tx,
                    EngineEvent::Reflection {
                        node_id: draft.id.to_string(),
                        preview: preview(&reflection),
                    },
                );

                let mut extras = Vec::new();
                for _ in 1..session.consistency_samples.max(1) {
                    if let Some(extra) = reflect_with_retry(session, query, &trajectory).await {
                        extras.push(extra);
                    }
                }

                let evaluation = session
                    .evaluator
                    .evaluate(query, &draft.content, &reflection, &draft.tool_results, &extras)
                    .await;
                send_event(
                    &session.event_tx,
                    EngineEvent::Score {
                        node_id: draft.id.to_string(),
                        value: evaluation.score,
                    },
                );
                Some((draft, reflection, evaluation))
            }
        });
        let produced: Vec<(CandidateDraft, String, Evaluation)> =
            join_all(tasks).await.into_iter().flatten().collect();

        // 取消时丢弃本轮全部半成品，不挂树
        if session.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        tree.search_budget -= 1;
        lap += 1;

        if produced.is_empty() {
            // 整轮失败：预算已记，保证前进
            tracing::warn!("expansion round produced no candidates, moving on");
            continue;
        }

        if let Some(parent) = tree.get_mut(selected) {
            parent.untried = false;
        }

        for (draft, reflection, evaluation) in produced {
            let mut node = ReasoningNode::child(draft.id, selected, draft.content);
            node.reflection = Some(reflection);
            node.tool_results = draft.tool_results;
            node.info_insufficient = evaluation.info_insufficient;
            node.is_terminal = is_terminal_answer(&node.content)
                && evaluation.completeness > session.completeness_threshold;
            let id = node.id;
            let is_term = node.is_terminal;
            tree.attach_child(node);
            backpropagate(&mut tree, id, evaluation.score, session.gamma);

            if is_term {
                let better = match terminal {
                    None => true,
                    Some(t) => {
                        let new_mean = tree.get(id).map(|n| n.mean_value()).unwrap_or(0.0);
                        let old_mean = tree.get(t).map(|n| n.mean_value()).unwrap_or(0.0);
                        new_mean > old_mean
                    }
                };
                if better {
                    terminal = Some(id);
                }
            }
        }

        if terminal.is_some() {
            break;
        }
    }

    finalize(session, tree, terminal, lap)
}

/// 收尾：确定最终节点、拼轨迹与反思链、发 Done
fn finalize(
    session: &SearchSession,
    tree: Tree,
    terminal: Option<NodeId>,
    laps: u32,
) -> Result<SearchOutcome, EngineError> {
    let (best_id, low_confidence) = match terminal {
        Some(id) => (id, false),
        None => (tree.best_path_node(), true),
    };

    let path = tree.path_to_root(best_id);
    let trajectory: Vec<String> = path
        .iter()
        .filter_map(|id| tree.get(*id))
        .map(|n| n.content.clone())
        .collect();
    let reflections: Vec<String> = path
        .iter()
        .filter_map(|id| tree.get(*id))
        .filter_map(|n| n.reflection.clone())
        .collect();

    let final_content = tree
        .get(best_id)
        .map(|n| n.content.clone())
        .unwrap_or_default();
    let final_answer =
        extract_final_answer(&final_content).unwrap_or_else(|| visible_text(&final_content));

    if low_confidence {
        tracing::info!(node = %best_id, "finishing without confirmed terminal answer");
    }

    send_event(
        &session.event_tx,
        EngineEvent::Done {
            final_node_id: best_id.to_string(),
        },
    );

    Ok(SearchOutcome {
        final_answer,
        final_node_id: best_id,
        trajectory,
        reflections,
        laps,
        low_confidence,
        tree,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_answer_marker_required() {
        assert!(!is_terminal_answer("Paris is nice."));
        assert!(is_terminal_answer(
            "Final Answer: The capital of France is Paris."
        ));
    }

    #[test]
    fn test_short_answer_not_terminal() {
        assert!(!is_terminal_answer("Final Answer: Paris"));
    }

    #[test]
    fn test_incomplete_markers_block_termination() {
        assert!(!is_terminal_answer(
            "Final Answer: I need to search for more data first."
        ));
        assert!(!is_terminal_answer("Answer: to be continued shortly here"));
    }

    #[test]
    fn test_extract_final_answer_strips_think_blocks() {
        let content = "<think>reasoning here</think>Final Answer: Paris, population 2.1 million.";
        assert_eq!(
            extract_final_answer(content).unwrap(),
            "Paris, population 2.1 million."
        );
    }

    #[test]
    fn test_longer_marker_wins() {
        let content = "Final Answer: the full result is forty two";
        // 不应该在 "Answer:" 处截断出 ": the full result..."
        assert_eq!(
            extract_final_answer(content).unwrap(),
            "the full result is forty two"
        );
    }
}
