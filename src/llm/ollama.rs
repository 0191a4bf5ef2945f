//! Ollama API 客户端
//!
//! 直连 Ollama /api/chat；非流式取 message.content，流式逐行解析 NDJSON 增量。
//! 本地推理栈（如 deepseek-r1 系列）会在输出中带 <think> 标记，由上层解析。

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;

use crate::llm::{LlmClient, Message, Role, TokenStream};

/// Ollama 客户端：持有 base_url 与 model 名
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    fn to_payload(&self, messages: &[Message], temperature: f32, stream: bool) -> serde_json::Value {
        let msgs: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                json!({"role": role, "content": m.content})
            })
            .collect();
        json!({
            "model": self.model,
            "messages": msgs,
            "stream": stream,
            "options": {"temperature": temperature}
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, messages: &[Message], temperature: f32) -> Result<String, String> {
        let url = format!("{}/api/chat", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&self.to_payload(messages, temperature, false))
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| format!("Read body: {}", e))?;

        Ok(body
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string())
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        temperature: f32,
    ) -> Result<TokenStream, String> {
        let url = format!("{}/api/chat", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&self.to_payload(messages, temperature, true))
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }

        // NDJSON：每行一个 JSON 对象；chunk 边界与行边界不对齐，需要滚动缓冲
        let tokens = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| e.to_string()))
            .scan(String::new(), |buf, chunk| {
                let out: Vec<Result<String, String>> = match chunk {
                    Ok(bytes) => {
                        buf.push_str(&String::from_utf8_lossy(&bytes));
                        let mut toks = Vec::new();
                        while let Some(pos) = buf.find('\n') {
                            let line: String = buf.drain(..=pos).collect();
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            if let Ok(v) = serde_json::from_str::<serde_json::Value>(line) {
                                if let Some(tok) = v
                                    .get("message")
                                    .and_then(|m| m.get("content"))
                                    .and_then(|c| c.as_str())
                                {
                                    if !tok.is_empty() {
                                        toks.push(Ok(tok.to_string()));
                                    }
                                }
                            }
                        }
                        toks
                    }
                    Err(e) => vec![Err(e)],
                };
                futures_util::future::ready(Some(futures_util::stream::iter(out)))
            })
            .flatten();

        Ok(Box::pin(tokens))
    }
}
