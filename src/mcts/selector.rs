//! UCT 选择
//!
//! 从根贪心下行：每个分叉点取 UCT 最高的子节点；未访问子节点视为无限优先；
//! 并列取最小下标（可复现）。只进入仍含可扩展节点的子树；整树无可扩展节点
//! 时返回 EmptyTree，由主循环转入「以当前最优节点收尾」。

use crate::core::EngineError;
use crate::tree::{NodeId, ReasoningNode, Tree};

/// UCT 分数：mean + c·sqrt(ln(parent_visits) / visits)；未访问为无穷大
pub fn uct_score(child: &ReasoningNode, parent_visits: u32, exploration: f64) -> f64 {
    if child.visits == 0 {
        return f64::INFINITY;
    }
    let exploitation = child.mean_value();
    let parent_visits = parent_visits.max(1) as f64;
    let explore = exploration * (parent_visits.ln() / child.visits as f64).sqrt();
    exploitation + explore
}

/// 节点自身可扩展：非终止、未到深度上限、仍有未生成的子节点
fn node_expandable(tree: &Tree, node: &ReasoningNode) -> bool {
    !node.is_terminal && node.untried && tree.depth(node.id) < tree.max_depth
}

/// 子树中是否存在可扩展节点
fn subtree_expandable(tree: &Tree, id: NodeId) -> bool {
    let node = match tree.get(id) {
        Some(n) => n,
        None => return false,
    };
    if node.is_terminal {
        return false;
    }
    if node_expandable(tree, node) {
        return true;
    }
    node.children_ids
        .iter()
        .any(|cid| subtree_expandable(tree, *cid))
}

pub struct Selector {
    pub exploration: f64,
}

impl Selector {
    pub fn new(exploration: f64) -> Self {
        Self { exploration }
    }

    /// 选出下一个待扩展节点
    pub fn select(&self, tree: &Tree) -> Result<NodeId, EngineError> {
        if !subtree_expandable(tree, tree.root_id) {
            return Err(EngineError::EmptyTree);
        }

        let mut current = tree.root_id;
        loop {
            let node = tree.get(current).ok_or(EngineError::EmptyTree)?;
            if node_expandable(tree, node) {
                return Ok(current);
            }

            // 在仍含可扩展节点的子树里取 UCT 最高者；严格大于才替换，保证并列取最小下标
            let mut best: Option<(NodeId, f64)> = None;
            for cid in &node.children_ids {
                if !subtree_expandable(tree, *cid) {
                    continue;
                }
                let child = match tree.get(*cid) {
                    Some(c) => c,
                    None => continue,
                };
                let score = uct_score(child, node.visits, self.exploration);
                let better = match best {
                    None => true,
                    Some((_, best_score)) => score > best_score,
                };
                if better {
                    best = Some((*cid, score));
                }
            }

            match best {
                Some((cid, _)) => current = cid,
                // subtree_expandable 已保证这里不可达，防御性返回
                None => return Err(EngineError::EmptyTree),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_child(tree: &mut Tree, parent: NodeId, visits: u32, value_sum: f64) -> NodeId {
        let mut child = ReasoningNode::child(NodeId::new(), parent, "c");
        child.visits = visits;
        child.value_sum = value_sum;
        let id = child.id;
        tree.attach_child(child);
        id
    }

    #[test]
    fn test_unexpanded_root_is_selected() {
        let tree = Tree::new("q", 5, 10);
        let selector = Selector::new(1.4);
        assert_eq!(selector.select(&tree).unwrap(), tree.root_id);
    }

    #[test]
    fn test_unvisited_child_beats_any_visited_child() {
        let mut tree = Tree::new("q", 5, 10);
        let root_id = tree.root_id;
        tree.get_mut(root_id).unwrap().untried = false;
        tree.get_mut(root_id).unwrap().visits = 10;

        // 高均值但已访问
        add_child(&mut tree, root_id, 5, 4.9);
        // 未访问
        let fresh = add_child(&mut tree, root_id, 0, 0.0);

        let selector = Selector::new(1.4);
        assert_eq!(selector.select(&tree).unwrap(), fresh);
    }

    #[test]
    fn test_tie_breaks_to_lowest_index() {
        let mut tree = Tree::new("q", 5, 10);
        let root_id = tree.root_id;
        tree.get_mut(root_id).unwrap().untried = false;
        tree.get_mut(root_id).unwrap().visits = 4;

        let first = add_child(&mut tree, root_id, 2, 1.0);
        let _second = add_child(&mut tree, root_id, 2, 1.0);

        let selector = Selector::new(1.4);
        assert_eq!(selector.select(&tree).unwrap(), first);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let mut tree = Tree::new("q", 5, 10);
        let root_id = tree.root_id;
        tree.get_mut(root_id).unwrap().untried = false;
        tree.get_mut(root_id).unwrap().visits = 6;

        add_child(&mut tree, root_id, 3, 1.2);
        add_child(&mut tree, root_id, 2, 1.1);
        add_child(&mut tree, root_id, 1, 0.3);

        let selector = Selector::new(1.4);
        let first = selector.select(&tree).unwrap();
        for _ in 0..10 {
            assert_eq!(selector.select(&tree).unwrap(), first);
        }
    }

    #[test]
    fn test_terminal_subtrees_are_skipped() {
        let mut tree = Tree::new("q", 5, 10);
        let root_id = tree.root_id;
        tree.get_mut(root_id).unwrap().untried = false;
        tree.get_mut(root_id).unwrap().visits = 4;

        let done = add_child(&mut tree, root_id, 3, 2.9);
        tree.get_mut(done).unwrap().is_terminal = true;
        let open = add_child(&mut tree, root_id, 1, 0.1);

        let selector = Selector::new(1.4);
        assert_eq!(selector.select(&tree).unwrap(), open);
    }

    #[test]
    fn test_all_terminal_yields_empty_tree() {
        let mut tree = Tree::new("q", 5, 10);
        let root_id = tree.root_id;
        tree.get_mut(root_id).unwrap().untried = false;
        let a = add_child(&mut tree, root_id, 1, 0.5);
        tree.get_mut(a).unwrap().is_terminal = true;

        let selector = Selector::new(1.4);
        assert!(matches!(
            selector.select(&tree),
            Err(EngineError::EmptyTree)
        ));
    }

    #[test]
    fn test_max_depth_exhausts_tree() {
        let mut tree = Tree::new("q", 5, 1);
        let root_id = tree.root_id;
        tree.get_mut(root_id).unwrap().untried = false;
        // 深度 1 的子节点已到 max_depth，不可再扩展
        add_child(&mut tree, root_id, 1, 0.5);

        let selector = Selector::new(1.4);
        assert!(matches!(
            selector.select(&tree),
            Err(EngineError::EmptyTree)
        ));
    }
}
