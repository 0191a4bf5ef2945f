//! 推理树：id→节点的扁平映射
//!
//! 父子关系全部以 NodeId 存储，不持有嵌套所有权；每个查询独立一棵树，
//! 产出终答或预算耗尽后整树丢弃，查询之间无共享状态。

use std::collections::HashMap;

use crate::tree::{NodeId, ReasoningNode};

#[derive(Debug)]
pub struct Tree {
    pub root_id: NodeId,
    nodes: HashMap<NodeId, ReasoningNode>,
    /// 剩余检索预算，单调递减
    pub search_budget: u32,
    pub max_depth: usize,
}

impl Tree {
    /// 以单个根节点创建（content 为问题框架）
    pub fn new(root_content: impl Into<String>, search_budget: u32, max_depth: usize) -> Self {
        let root = ReasoningNode::root(root_content);
        let root_id = root.id;
        let mut nodes = HashMap::new();
        nodes.insert(root_id, root);
        Self {
            root_id,
            nodes,
            search_budget,
            max_depth,
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&ReasoningNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut ReasoningNode> {
        self.nodes.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 挂接一个已构建完整的子节点（扩展成功后才调用；取消的半成品不入树）
    pub fn attach_child(&mut self, node: ReasoningNode) {
        let parent_id = node.parent_id.expect("child node must have a parent");
        let id = node.id;
        self.nodes.insert(id, node);
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.children_ids.push(id);
        }
    }

    /// 节点深度：根为 0
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.get(id).and_then(|n| n.parent_id);
        while let Some(pid) = current {
            depth += 1;
            current = self.get(pid).and_then(|n| n.parent_id);
        }
        depth
    }

    /// 根→节点路径上的所有 id（根在前）
    pub fn path_to_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(cid) = current {
            path.push(cid);
            current = self.get(cid).and_then(|n| n.parent_id);
        }
        path.reverse();
        path
    }

    /// 沿当前最优路径（逐层取均值最高的已访问子节点）返回均值最高的节点，
    /// 作为预算耗尽 / 无可扩展节点时的答案来源
    pub fn best_path_node(&self) -> NodeId {
        let mut best_id = self.root_id;
        let mut best_mean = self
            .get(self.root_id)
            .map(|n| n.mean_value())
            .unwrap_or(0.0);
        let mut current = self.root_id;

        loop {
            let node = match self.get(current) {
                Some(n) => n,
                None => break,
            };
            let next = node
                .children_ids
                .iter()
                .filter_map(|cid| self.get(*cid))
                .filter(|c| c.visits > 0)
                .max_by(|a, b| {
                    a.mean_value()
                        .partial_cmp(&b.mean_value())
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            match next {
                Some(child) => {
                    if child.mean_value() >= best_mean {
                        best_mean = child.mean_value();
                        best_id = child.id;
                    }
                    current = child.id;
                }
                None => break,
            }
        }

        best_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tree_has_single_root() {
        let tree = Tree::new("query", 5, 10);
        assert_eq!(tree.len(), 1);
        let root = tree.get(tree.root_id).unwrap();
        assert!(root.parent_id.is_none());
        assert!(root.untried);
        assert_eq!(root.visits, 0);
    }

    #[test]
    fn test_attach_child_links_both_ways() {
        let mut tree = Tree::new("query", 5, 10);
        let root_id = tree.root_id;
        let child = ReasoningNode::child(crate::tree::NodeId::new(), root_id, "step one");
        let child_id = child.id;
        tree.attach_child(child);

        assert_eq!(tree.get(root_id).unwrap().children_ids, vec![child_id]);
        assert_eq!(tree.get(child_id).unwrap().parent_id, Some(root_id));
        assert_eq!(tree.depth(child_id), 1);
    }

    #[test]
    fn test_path_to_root_is_root_first() {
        let mut tree = Tree::new("query", 5, 10);
        let root_id = tree.root_id;
        let a = ReasoningNode::child(crate::tree::NodeId::new(), root_id, "a");
        let a_id = a.id;
        tree.attach_child(a);
        let b = ReasoningNode::child(crate::tree::NodeId::new(), a_id, "b");
        let b_id = b.id;
        tree.attach_child(b);

        assert_eq!(tree.path_to_root(b_id), vec![root_id, a_id, b_id]);
    }

    #[test]
    fn test_best_path_node_follows_mean_value() {
        let mut tree = Tree::new("query", 5, 10);
        let root_id = tree.root_id;

        let mut low = ReasoningNode::child(crate::tree::NodeId::new(), root_id, "low");
        low.visits = 2;
        low.value_sum = 0.4; // mean 0.2
        let mut high = ReasoningNode::child(crate::tree::NodeId::new(), root_id, "high");
        high.visits = 2;
        high.value_sum = 1.6; // mean 0.8
        let high_id = high.id;
        tree.attach_child(low);
        tree.attach_child(high);

        assert_eq!(tree.best_path_node(), high_id);
    }
}
