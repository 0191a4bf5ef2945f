//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 两种喂法：按提示词子串匹配规则（每条规则可带多个顺序回复，并发调用下仍确定），
//! 或整体脚本队列。都没命中时回显最后一条 User 消息。
//! complete_stream 会把回复切成小块吐出，以覆盖标记跨 chunk 截断的路径。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{LlmClient, Message, Role, TokenStream};

/// 流式输出时每块字符数（刻意取小，制造标记截断）
const STREAM_CHUNK_CHARS: usize = 7;

struct Rule {
    pattern: String,
    responses: Mutex<VecDeque<String>>,
    last: String,
}

/// Mock 客户端：规则匹配 + 脚本队列 + 回显兜底
#[derive(Default)]
pub struct MockLlmClient {
    rules: Vec<Rule>,
    script: Mutex<VecDeque<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条规则：提示词包含 pattern 时按顺序返回 responses，耗尽后重复最后一条
    pub fn with_rule(mut self, pattern: &str, responses: Vec<&str>) -> Self {
        let last = responses.last().map(|s| s.to_string()).unwrap_or_default();
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            last,
        });
        self
    }

    /// 整体脚本：每次调用弹出一条（优先级高于规则）
    pub fn scripted(responses: Vec<&str>) -> Self {
        Self {
            rules: Vec::new(),
            script: Mutex::new(responses.into_iter().map(String::from).collect()),
        }
    }

    fn respond(&self, messages: &[Message]) -> String {
        if let Some(next) = self.script.lock().expect("script lock").pop_front() {
            return next;
        }

        let prompt: String = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        for rule in &self.rules {
            if prompt.contains(&rule.pattern) {
                let mut q = rule.responses.lock().expect("rule lock");
                return q.pop_front().unwrap_or_else(|| rule.last.clone());
            }
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        format!("Echo from Mock: {}", last_user)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message], _temperature: f32) -> Result<String, String> {
        Ok(self.respond(messages))
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        _temperature: f32,
    ) -> Result<TokenStream, String> {
        let content = self.respond(messages);
        let chunks: Vec<Result<String, String>> = content
            .chars()
            .collect::<Vec<_>>()
            .chunks(STREAM_CHUNK_CHARS)
            .map(|c| Ok(c.iter().collect::<String>()))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}
