//! 价值回传
//!
//! 从被评估节点走到根：每跳 visits += 1、value_sum += 当前分值，
//! 然后分值乘以 gamma 再上行，越远的祖先分到越少。

use crate::tree::{NodeId, Tree};

pub fn backpropagate(tree: &mut Tree, node_id: NodeId, score: f64, gamma: f64) {
    let mut current = Some(node_id);
    let mut value = score;
    while let Some(id) = current {
        let node = match tree.get_mut(id) {
            Some(n) => n,
            None => break,
        };
        node.visits += 1;
        node.value_sum += value;
        value *= gamma;
        current = node.parent_id;
    }
}
