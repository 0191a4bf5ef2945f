//! 工具调用器：分层深度检索 + 超时 / 重试 / 降级
//!
//! snippets 只取摘要；selective 追加抓取相关度前 3 的页面；deep 抓取前 7。
//! 提供方失败退避重试一次，仍失败则降级为空结果；调用方必须把空结果当作
//! 「没有新信息」，而不是可无限重试的错误。结果带 TTL 缓存。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::time::{sleep, timeout};

use crate::core::EngineError;
use crate::tools::{DepthTier, FetchedPage, SearchProvider, SearchResult};

/// 重试前的退避
const RETRY_BACKOFF: Duration = Duration::from_millis(500);
/// 缓存条数上限，超出时淘汰最旧的一批
const CACHE_MAX_ENTRIES: usize = 100;
const CACHE_EVICT_BATCH: usize = 20;

/// 可信域名 → 质量分；未知来源 0.5
const TRUSTED_DOMAINS: &[(&str, f64)] = &[
    ("wikipedia.org", 1.0),
    (".gov", 0.95),
    (".edu", 0.9),
    ("reuters.com", 0.9),
    ("bbc.com", 0.9),
    ("nature.com", 0.95),
    ("arxiv.org", 0.9),
    ("github.com", 0.85),
    ("stackoverflow.com", 0.85),
    ("medium.com", 0.6),
    ("reddit.com", 0.5),
];

/// 来源质量分（按域名查表）
pub fn score_source_quality(url: &str) -> f64 {
    let url_lower = url.to_lowercase();
    for (domain, score) in TRUSTED_DOMAINS {
        if url_lower.contains(domain) {
            return *score;
        }
    }
    0.5
}

/// 摘要与查询的相关度：查询词项在摘要中的命中率
pub fn score_snippet_relevance(snippet: &str, query: &str) -> f64 {
    if snippet.is_empty() || query.is_empty() {
        return 0.0;
    }
    let snippet_lower = snippet.to_lowercase();
    let terms: Vec<&str> = query.split_whitespace().collect();
    if terms.is_empty() {
        return 0.0;
    }
    let matches = terms
        .iter()
        .filter(|t| snippet_lower.contains(&t.to_lowercase()))
        .count();
    (matches as f64 / terms.len() as f64).min(1.0)
}

/// 工具调用器：包装提供方并施加分层 / 超时 / 重试 / 缓存策略
pub struct ToolInvoker {
    provider: Arc<dyn SearchProvider>,
    timeout: Duration,
    max_results: usize,
    cache_ttl: Duration,
    cache: Mutex<HashMap<String, (SearchResult, Instant)>>,
}

impl ToolInvoker {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        timeout_secs: u64,
        max_results: usize,
        cache_ttl_secs: u64,
    ) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(timeout_secs),
            max_results,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// 按层级执行检索。设计上不返回错误：提供方故障降级为空结果。
    /// 查询会附上当前日期以获得时间上下文。
    pub async fn search(&self, query: &str, tier: DepthTier) -> SearchResult {
        let cache_key = format!("{}|{}", query, tier);
        if let Some(cached) = self.cache_get(&cache_key) {
            tracing::debug!(query = %query, "search cache hit");
            return cached;
        }

        let dated = format!(
            "{} (as of {})",
            query,
            chrono::Local::now().format("%Y-%m-%d")
        );
        tracing::info!(query = %dated, tier = %tier, "tool search");

        let hits = match self.search_with_retry(&dated).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "search degraded to empty result");
                return SearchResult::empty(self.provider.name(), query, tier);
            }
        };

        // 按 0.6·相关度 + 0.4·来源质量 排序，决定抓取顺序
        let mut scored: Vec<(f64, crate::tools::SearchHit)> = hits
            .into_iter()
            .map(|h| {
                let combined = 0.6 * score_snippet_relevance(&h.snippet, query)
                    + 0.4 * score_source_quality(&h.url);
                (combined, h)
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let hits: Vec<crate::tools::SearchHit> = scored.into_iter().map(|(_, h)| h).collect();

        let pages = self.fetch_pages(&hits, tier.fetch_count()).await;

        let result = SearchResult {
            provider: self.provider.name().to_string(),
            query: query.to_string(),
            hits,
            depth_tier: tier,
            pages,
        };
        self.cache_put(cache_key, result.clone());
        result
    }

    /// 一次重试（退避后），再失败交给上层降级
    async fn search_with_retry(
        &self,
        query: &str,
    ) -> Result<Vec<crate::tools::SearchHit>, EngineError> {
        match timeout(self.timeout, self.provider.search(query, self.max_results)).await {
            Ok(Ok(hits)) => return Ok(hits),
            Ok(Err(e)) => tracing::warn!(error = %e, "search attempt failed, retrying"),
            Err(_) => tracing::warn!("search attempt timed out, retrying"),
        }
        sleep(RETRY_BACKOFF).await;
        match timeout(self.timeout, self.provider.search(query, self.max_results)).await {
            Ok(Ok(hits)) => Ok(hits),
            Ok(Err(e)) => Err(EngineError::ToolUnavailable(e)),
            Err(_) => Err(EngineError::ToolUnavailable("timeout".to_string())),
        }
    }

    /// 并发抓取前 n 条命中的正文；单页失败只跳过该页
    async fn fetch_pages(&self, hits: &[crate::tools::SearchHit], n: usize) -> Vec<FetchedPage> {
        if n == 0 {
            return Vec::new();
        }
        let tasks = hits.iter().take(n).map(|h| {
            let url = h.url.clone();
            async move {
                match timeout(self.timeout, self.provider.fetch(&url)).await {
                    Ok(Ok(content)) if !content.trim().is_empty() => {
                        Some(FetchedPage { url, content })
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(url = %url, error = %e, "page fetch failed");
                        None
                    }
                    _ => None,
                }
            }
        });
        join_all(tasks).await.into_iter().flatten().collect()
    }

    fn cache_get(&self, key: &str) -> Option<SearchResult> {
        let mut cache = self.cache.lock().expect("cache lock");
        if let Some((result, at)) = cache.get(key) {
            if at.elapsed() < self.cache_ttl {
                return Some(result.clone());
            }
            cache.remove(key);
        }
        None
    }

    fn cache_put(&self, key: String, result: SearchResult) {
        let mut cache = self.cache.lock().expect("cache lock");
        cache.insert(key, (result, Instant::now()));
        if cache.len() > CACHE_MAX_ENTRIES {
            let mut keys: Vec<(String, Instant)> = cache
                .iter()
                .map(|(k, (_, at))| (k.clone(), *at))
                .collect();
            keys.sort_by_key(|(_, at)| *at);
            for (k, _) in keys.into_iter().take(CACHE_EVICT_BATCH) {
                cache.remove(&k);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{MockSearchProvider, SearchHit};

    fn paris_hits() -> Vec<SearchHit> {
        vec![SearchHit {
            title: "Paris - Wikipedia".to_string(),
            url: "https://en.wikipedia.org/wiki/Paris".to_string(),
            snippet: "Paris is the capital of France.".to_string(),
        }]
    }

    #[test]
    fn test_source_quality_table() {
        assert_eq!(score_source_quality("https://en.wikipedia.org/wiki/X"), 1.0);
        assert_eq!(score_source_quality("https://blog.example.com/x"), 0.5);
    }

    #[test]
    fn test_snippet_relevance_term_overlap() {
        let r = score_snippet_relevance("Paris is the capital of France", "capital France");
        assert!((r - 1.0).abs() < 1e-9);
        assert_eq!(score_snippet_relevance("", "capital"), 0.0);
    }

    #[tokio::test]
    async fn test_search_returns_hits_and_caches() {
        let provider = Arc::new(MockSearchProvider::new(paris_hits()));
        let invoker = ToolInvoker::new(provider.clone(), 5, 5, 600);

        let first = invoker.search("capital of France", DepthTier::Snippets).await;
        assert_eq!(first.hits.len(), 1);
        let second = invoker.search("capital of France", DepthTier::Snippets).await;
        assert_eq!(second.hits.len(), 1);
        // 第二次命中缓存，提供方只被调用一次
        assert_eq!(*provider.search_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_one_retry_then_success() {
        let provider = Arc::new(MockSearchProvider::new(paris_hits()).failing_first(1));
        let invoker = ToolInvoker::new(provider.clone(), 5, 5, 600);

        let result = invoker.search("capital of France", DepthTier::Snippets).await;
        assert_eq!(result.hits.len(), 1);
        assert_eq!(*provider.search_calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_persistent_failure_degrades_to_empty() {
        let provider = Arc::new(MockSearchProvider::new(paris_hits()).failing_first(10));
        let invoker = ToolInvoker::new(provider.clone(), 5, 5, 600);

        let result = invoker.search("capital of France", DepthTier::Snippets).await;
        assert!(result.is_empty());
        // 一次重试后放弃，不会无限循环
        assert_eq!(*provider.search_calls.lock().unwrap(), 2);
    }
}
