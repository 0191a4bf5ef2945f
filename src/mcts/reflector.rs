//! 反思：对完整轨迹生成结构化自评
//!
//! 产出自由文本批评（正确性 / 完整性 / 效率 / 缺失信息），永远不问「对不对」：
//! 二元自评不可靠；分析文本是评估的输入而非输出。

use std::sync::Arc;

use crate::llm::{LlmClient, Message};
use crate::mcts::prompts::REFLECT_SYSTEM_PROMPT;

pub struct Reflector {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

impl Reflector {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            temperature: 0.3,
        }
    }

    /// 批评 root→node 的完整轨迹
    pub async fn reflect(&self, query: &str, trajectory: &str) -> Result<String, String> {
        let prompt = format!(
            "Original question: {}\n\nReasoning trajectory so far:\n{}\n\nWrite your critique.",
            query, trajectory
        );
        let messages = vec![
            Message::system(REFLECT_SYSTEM_PROMPT),
            Message::user(prompt),
        ];
        let critique = self.llm.complete(&messages, self.temperature).await?;
        Ok(critique.trim().to_string())
    }
}
