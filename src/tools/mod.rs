//! 分层网络检索：提供方抽象与调用器

pub mod invoker;
pub mod provider;

pub use invoker::ToolInvoker;
pub use provider::{
    DepthTier, DuckDuckGoProvider, FetchedPage, MockSearchProvider, SearchHit, SearchProvider,
    SearchResult,
};

use std::sync::Arc;

use crate::config::SearchSection;

/// 按配置创建检索提供方：duckduckgo / mock（离线调试）
pub fn create_provider(cfg: &SearchSection) -> Arc<dyn SearchProvider> {
    match cfg.provider.as_str() {
        "mock" => Arc::new(MockSearchProvider::new(Vec::new())),
        _ => Arc::new(DuckDuckGoProvider::new(
            cfg.timeout_secs,
            cfg.max_page_chars,
        )),
    }
}
