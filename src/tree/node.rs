//! 推理树节点

use std::fmt;

use uuid::Uuid;

use crate::tools::SearchResult;

/// 节点 ID（树实例内唯一）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 推理节点：content 是本步产生的增量文本，沿 root→node 拼接即得模型所见的完整轨迹
#[derive(Debug, Clone)]
pub struct ReasoningNode {
    pub id: NodeId,
    /// 根节点无父
    pub parent_id: Option<NodeId>,
    /// 插入顺序 = 扩展顺序
    pub children_ids: Vec<NodeId>,
    pub content: String,
    /// 回传经过本节点的次数
    pub visits: u32,
    /// 累计回传价值，均值 = value_sum / max(visits, 1)
    pub value_sum: f64,
    /// 自评文本，Reflector 写入一次
    pub reflection: Option<String>,
    /// 本节点发起检索时由调用器附上
    pub tool_results: Vec<SearchResult>,
    /// 由主循环判定：内容已构成完整、充分的答案
    pub is_terminal: bool,
    /// 仍有未生成的子节点（驱动「选择 vs 扩展」决策）
    pub untried: bool,
    /// 评估认为该节点信息仍不足（驱动检索深度升级）
    pub info_insufficient: bool,
}

impl ReasoningNode {
    pub fn root(content: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            parent_id: None,
            children_ids: Vec::new(),
            content: content.into(),
            visits: 0,
            value_sum: 0.0,
            reflection: None,
            tool_results: Vec::new(),
            is_terminal: false,
            untried: true,
            info_insufficient: false,
        }
    }

    pub fn child(id: NodeId, parent_id: NodeId, content: impl Into<String>) -> Self {
        Self {
            id,
            parent_id: Some(parent_id),
            children_ids: Vec::new(),
            content: content.into(),
            visits: 0,
            value_sum: 0.0,
            reflection: None,
            tool_results: Vec::new(),
            is_terminal: false,
            untried: true,
            info_insufficient: false,
        }
    }

    /// 节点均值；未访问时为 0
    pub fn mean_value(&self) -> f64 {
        self.value_sum / self.visits.max(1) as f64
    }
}
