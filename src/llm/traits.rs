//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Ollama / Mock）实现 LlmClient：complete（非流式）、
//! complete_stream（流式 Token）、complete_json（约束 JSON 模式，供评分等结构化输出使用）。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::llm::Message;

/// Token 流：每项为一段增量文本
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, String>> + Send>>;

/// LLM 客户端 trait：非流式完成、流式完成与宽松 JSON 完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message], temperature: f32) -> Result<String, String>;

    /// 流式完成，返回 Token 流
    async fn complete_stream(
        &self,
        messages: &[Message],
        temperature: f32,
    ) -> Result<TokenStream, String>;

    /// 约束 JSON 模式：期望模型输出一个 JSON 对象；从自由文本中宽松提取，
    /// 非法输出返回 None 而不是错误（单次坏生成不应中断搜索）
    async fn complete_json(
        &self,
        messages: &[Message],
        temperature: f32,
    ) -> Result<Option<serde_json::Value>, String> {
        let text = self.complete(messages, temperature).await?;
        Ok(extract_json_object(&text))
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 从文本中提取首个 JSON 对象（```json 块或首个 { 到末个 }）
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            &trimmed[start..=end]
        } else {
            return None;
        }
    } else {
        return None;
    };

    serde_json::from_str(json_str).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_json() {
        let v = extract_json_object(r#"{"score": 7.5, "completeness": 8}"#).unwrap();
        assert_eq!(v["score"].as_f64(), Some(7.5));
    }

    #[test]
    fn test_extract_fenced_json() {
        let v = extract_json_object("Sure!\n```json\n{\"score\": 3}\n```").unwrap();
        assert_eq!(v["score"].as_f64(), Some(3.0));
    }

    #[test]
    fn test_extract_embedded_json() {
        let v = extract_json_object("I would rate it {\"score\": 9} overall.").unwrap();
        assert_eq!(v["score"].as_f64(), Some(9.0));
    }

    #[test]
    fn test_extract_malformed_returns_none() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{broken").is_none());
    }
}
