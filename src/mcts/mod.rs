//! 树搜索推理：选择、扩展、反思、评估、回传与主循环
//!
//! - **selector**: UCT 下行选择
//! - **expander**: 候选生成与内嵌检索
//! - **reflector** / **evaluator**: 自评文本与加权评分
//! - **backprop**: 衰减回传
//! - **loop_**: 主循环（SELECT → EXPAND → REFLECT → EVALUATE → BACKPROP）
//! - **markers**: <think> / <search> 流式标记解析
//! - **policy**: 自适应分支与检索深度
//! - **events**: 过程事件（SSE / CLI 展示）

pub mod backprop;
pub mod evaluator;
pub mod events;
pub mod expander;
pub mod loop_;
pub mod markers;
pub mod policy;
pub mod prompts;
pub mod reflector;
pub mod selector;

pub use backprop::backpropagate;
pub use evaluator::{Evaluation, Evaluator, Weights};
pub use events::{EngineEvent, EventSender};
pub use expander::{trajectory_messages, trajectory_text, CandidateDraft, Expander};
pub use loop_::{
    extract_final_answer, is_terminal_answer, search_loop, SearchOutcome, SearchSession,
};
pub use markers::{visible_text, MarkerEvent, MarkerParser};
pub use policy::{AdaptiveBranching, BranchingPolicy, DepthPolicy, TieredDepth};
pub use reflector::Reflector;
pub use selector::{uct_score, Selector};
