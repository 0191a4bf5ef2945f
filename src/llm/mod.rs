//! LLM 客户端抽象与实现（OpenAI 兼容 / Ollama / Mock）

pub mod mock;
pub mod ollama;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use mock::MockLlmClient;
pub use ollama::OllamaClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{extract_json_object, LlmClient, TokenStream};

use crate::config::LlmSection;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 按配置创建 LLM 客户端：ollama / openai 兼容端点 / mock（离线调试）
pub fn create_llm(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    match cfg.provider.as_str() {
        "openai" | "deepseek" => Arc::new(OpenAiClient::new(
            cfg.base_url.as_deref(),
            &cfg.model,
            cfg.api_key.as_deref(),
        )),
        "mock" => Arc::new(MockLlmClient::new()),
        _ => Arc::new(OllamaClient::new(
            cfg.base_url
                .as_deref()
                .unwrap_or("http://127.0.0.1:11434"),
            &cfg.model,
            cfg.timeouts.request,
        )),
    }
}
