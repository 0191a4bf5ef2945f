//! 自适应策略：分支因子与检索深度
//!
//! 以小型纯函数接口表达（(tree, node) → 值），可整体替换；
//! 避免把启发式条件散落在主循环里。

use crate::tools::DepthTier;
use crate::tree::{ReasoningNode, Tree};

/// 分支因子策略：给定待扩展节点，返回本轮生成的候选数 k
pub trait BranchingPolicy: Send + Sync {
    fn branching(&self, tree: &Tree, node: &ReasoningNode) -> usize;
}

/// 检索深度策略：给定发起检索的节点，返回本次检索层级
pub trait DepthPolicy: Send + Sync {
    fn depth_tier(&self, tree: &Tree, node: &ReasoningNode, lap: u32) -> DepthTier;
}

/// 默认分支策略：兄弟价值分歧大 → 多探索；层数深 → 少分支多利用
pub struct AdaptiveBranching {
    pub default_k: usize,
    pub explore_k: usize,
    pub exploit_k: usize,
    pub variance_threshold: f64,
    pub depth_threshold: usize,
}

impl Default for AdaptiveBranching {
    fn default() -> Self {
        Self {
            default_k: 3,
            explore_k: 5,
            exploit_k: 2,
            variance_threshold: 0.3,
            depth_threshold: 3,
        }
    }
}

/// 样本方差（n-1 分母），不足两个样本为 0
fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

impl BranchingPolicy for AdaptiveBranching {
    fn branching(&self, tree: &Tree, node: &ReasoningNode) -> usize {
        // 已有子节点且价值分歧大：扩大探索
        if node.children_ids.len() > 1 {
            let child_values: Vec<f64> = node
                .children_ids
                .iter()
                .filter_map(|cid| tree.get(*cid))
                .map(|c| c.value_sum)
                .collect();
            if variance(&child_values) > self.variance_threshold {
                return self.explore_k;
            }
        }

        if tree.depth(node.id) > self.depth_threshold {
            return self.exploit_k;
        }

        self.default_k
    }
}

/// 默认深度策略：首圈一律 snippets；此后每当路径上出现「检索过但评估仍认为
/// 信息不足」的节点，就升一档，deep 封顶
pub struct TieredDepth;

impl DepthPolicy for TieredDepth {
    fn depth_tier(&self, tree: &Tree, node: &ReasoningNode, lap: u32) -> DepthTier {
        if lap == 0 {
            return DepthTier::Snippets;
        }
        let mut tier = DepthTier::Snippets;
        for id in tree.path_to_root(node.id) {
            if let Some(n) = tree.get(id) {
                if n.info_insufficient && !n.tool_results.is_empty() {
                    tier = tier.escalate();
                }
            }
        }
        tier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeId;

    fn tree_with_children(values: &[f64]) -> (Tree, NodeId) {
        let mut tree = Tree::new("q", 5, 10);
        let root_id = tree.root_id;
        for v in values {
            let mut child = ReasoningNode::child(NodeId::new(), root_id, "c");
            child.value_sum = *v;
            child.visits = 1;
            tree.attach_child(child);
        }
        (tree, root_id)
    }

    #[test]
    fn test_default_branching_without_children() {
        let tree = Tree::new("q", 5, 10);
        let policy = AdaptiveBranching::default();
        let root = tree.get(tree.root_id).unwrap();
        assert_eq!(policy.branching(&tree, root), 3);
    }

    #[test]
    fn test_high_variance_widens_branching() {
        let (tree, root_id) = tree_with_children(&[0.1, 2.0]);
        let policy = AdaptiveBranching::default();
        let root = tree.get(root_id).unwrap();
        assert_eq!(policy.branching(&tree, root), 5);
    }

    #[test]
    fn test_deep_node_narrows_branching() {
        let mut tree = Tree::new("q", 5, 10);
        let mut parent = tree.root_id;
        for _ in 0..5 {
            let child = ReasoningNode::child(NodeId::new(), parent, "c");
            parent = child.id;
            tree.attach_child(child);
        }
        let policy = AdaptiveBranching::default();
        let deep = tree.get(parent).unwrap();
        assert_eq!(policy.branching(&tree, deep), 2);
    }

    #[test]
    fn test_first_lap_is_snippets() {
        let tree = Tree::new("q", 5, 10);
        let root = tree.get(tree.root_id).unwrap();
        assert_eq!(TieredDepth.depth_tier(&tree, root, 0), DepthTier::Snippets);
    }

    #[test]
    fn test_insufficient_info_escalates() {
        let mut tree = Tree::new("q", 5, 10);
        let root_id = tree.root_id;
        let mut child = ReasoningNode::child(NodeId::new(), root_id, "c");
        child.info_insufficient = true;
        child.tool_results.push(crate::tools::SearchResult::empty(
            "mock",
            "q",
            DepthTier::Snippets,
        ));
        let child_id = child.id;
        tree.attach_child(child);

        let node = tree.get(child_id).unwrap();
        assert_eq!(TieredDepth.depth_tier(&tree, node, 1), DepthTier::Selective);
    }
}
