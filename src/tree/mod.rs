//! 推理树：扁平 arena 存储，父子关系以 NodeId 引用

pub mod node;
#[allow(clippy::module_inception)]
pub mod tree;

pub use node::{NodeId, ReasoningNode};
pub use tree::Tree;
