//! 检索提供方抽象与 DuckDuckGo 实现
//!
//! SearchProvider 只负责两件事：按查询返回带摘要的结果列表，以及抓取单个 URL 的正文。
//! 分层深度、排序、重试、缓存等策略全部在调用器一层。
//! HTML 响应用 html2text 提取可读文本，失败时退回手写去标签。

use std::sync::Mutex;

use async_trait::async_trait;
use html2text::from_read;
use serde::{Deserialize, Serialize};

/// 检索深度分层
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthTier {
    /// 仅提供方摘要（最快）
    Snippets,
    /// 摘要 + 抓取相关度前 3 的页面
    Selective,
    /// 摘要 + 抓取前 7 的页面
    Deep,
}

impl DepthTier {
    /// 升级一档，deep 封顶
    pub fn escalate(self) -> Self {
        match self {
            DepthTier::Snippets => DepthTier::Selective,
            DepthTier::Selective | DepthTier::Deep => DepthTier::Deep,
        }
    }

    /// 本层抓取的页面数
    pub fn fetch_count(self) -> usize {
        match self {
            DepthTier::Snippets => 0,
            DepthTier::Selective => 3,
            DepthTier::Deep => 7,
        }
    }
}

impl std::fmt::Display for DepthTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DepthTier::Snippets => "snippets",
            DepthTier::Selective => "selective",
            DepthTier::Deep => "deep",
        };
        write!(f, "{}", s)
    }
}

/// 单条检索命中
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// 抓取到的页面正文（selective / deep 层）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    pub content: String,
}

/// 一次检索的完整结果，挂在发起检索的节点上
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub provider: String,
    pub query: String,
    pub hits: Vec<SearchHit>,
    pub depth_tier: DepthTier,
    pub pages: Vec<FetchedPage>,
}

impl SearchResult {
    /// 空结果：提供方失败后的降级产物，调用方视为「没有新信息」
    pub fn empty(provider: &str, query: &str, depth_tier: DepthTier) -> Self {
        Self {
            provider: provider.to_string(),
            query: query.to_string(),
            hits: Vec::new(),
            depth_tier,
            pages: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty() && self.pages.is_empty()
    }

    /// 渲染为可直接注入模型上下文的文本块
    pub fn as_context_block(&self) -> String {
        if self.is_empty() {
            return "No search results found.".to_string();
        }
        let mut out = String::from("=== Search Snippets ===\n");
        for (i, hit) in self.hits.iter().enumerate() {
            out.push_str(&format!(
                "[{}] {}\n    URL: {}\n    Snippet: {}\n",
                i + 1,
                hit.title,
                hit.url,
                hit.snippet
            ));
        }
        if !self.pages.is_empty() {
            out.push_str("\n=== Detailed Content ===\n");
            for (i, page) in self.pages.iter().enumerate() {
                out.push_str(&format!(
                    "[Scraped {}] URL: {}\n{}\n---\n",
                    i + 1,
                    page.url,
                    page.content
                ));
            }
        }
        out
    }
}

/// 检索提供方 trait
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// 查询并返回带摘要的命中列表
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, String>;

    /// 抓取单个 URL 的可读正文
    async fn fetch(&self, url: &str) -> Result<String, String>;
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut prev_whitespace = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => {
                let is_whitespace = c.is_whitespace();
                if is_whitespace && prev_whitespace {
                    continue;
                }
                prev_whitespace = is_whitespace;
                out.push(if is_whitespace { ' ' } else { c });
            }
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.starts_with("<html")
        || s.starts_with("<HTML")
        || (s.len() > 20
            && s.contains('<')
            && (s.contains("</") || s.contains("<meta") || s.contains("<head") || s.contains("<title")))
}

fn html_to_text(html: &str) -> String {
    match from_read(html.as_bytes(), 120) {
        Ok(text) if !text.trim().is_empty() => text,
        _ => strip_html_tags(html),
    }
}

/// 截取两个定界串之间的内容
fn extract_between<'a>(s: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = s.find(start)? + start.len();
    let rest = &s[from..];
    let to = rest.find(end)?;
    Some(&rest[..to])
}

/// 最小化的百分号解码（DuckDuckGo 跳转链接里的 uddg 参数）
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// DuckDuckGo HTML 端点提供方：无需 API Key
pub struct DuckDuckGoProvider {
    client: reqwest::Client,
    max_page_chars: usize,
}

impl DuckDuckGoProvider {
    pub fn new(timeout_secs: u64, max_page_chars: usize) -> Self {
        // 使用现代浏览器 UA 与常用请求头，避免被站点识别为低版本或爬虫
        const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .default_headers({
                use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
                let mut h = reqwest::header::HeaderMap::new();
                h.insert(
                    ACCEPT,
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                        .parse()
                        .unwrap(),
                );
                h.insert(ACCEPT_LANGUAGE, "en-US,en;q=0.9".parse().unwrap());
                h
            })
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_page_chars,
        }
    }

    /// 从结果页 HTML 中解析命中列表。页面结构变动时宁可少解析也不报错。
    fn parse_results(html: &str, max_results: usize) -> Vec<SearchHit> {
        let mut hits = Vec::new();
        for block in html.split("result__a").skip(1) {
            if hits.len() >= max_results {
                break;
            }
            // 锚点的 href 在切分点之前已被消费，改为向后找本块内的链接与文本
            let url = extract_between(block, "href=\"", "\"")
                .map(|raw| {
                    if let Some(pos) = raw.find("uddg=") {
                        let enc = &raw[pos + 5..];
                        let enc = enc.split('&').next().unwrap_or(enc);
                        percent_decode(enc)
                    } else {
                        raw.to_string()
                    }
                })
                .unwrap_or_default();
            let title = extract_between(block, ">", "</a>")
                .map(strip_html_tags)
                .unwrap_or_default();
            let snippet = extract_between(block, "result__snippet", "</a>")
                .or_else(|| extract_between(block, "result__snippet", "</td>"))
                .map(|s| {
                    // 去掉残留的属性尾巴（class 名之后直到标签闭合）
                    let s = s.find('>').map(|i| &s[i + 1..]).unwrap_or(s);
                    strip_html_tags(s)
                })
                .unwrap_or_default();

            if title.is_empty() && snippet.is_empty() {
                continue;
            }
            hits.push(SearchHit {
                title,
                url,
                snippet,
            });
        }
        hits
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, String> {
        let url = "https://html.duckduckgo.com/html/";
        let resp = self
            .client
            .get(url)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }

        let body = resp.text().await.map_err(|e| format!("Read body: {}", e))?;
        Ok(Self::parse_results(&body, max_results))
    }

    async fn fetch(&self, url: &str) -> Result<String, String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }

        let mut body = resp.text().await.map_err(|e| format!("Read body: {}", e))?;
        if body.starts_with('\u{FEFF}') {
            body = body[1..].to_string();
        }

        let text = if looks_like_html(&body) {
            html_to_text(&body)
        } else {
            body
        };

        let len = text.chars().count();
        if len > self.max_page_chars {
            Ok(text.chars().take(self.max_page_chars).collect::<String>() + "\n...[truncated]")
        } else {
            Ok(text)
        }
    }
}

/// Mock 提供方：预置命中列表，记录调用次数（测试与离线调试）
pub struct MockSearchProvider {
    hits: Vec<SearchHit>,
    pages: Vec<FetchedPage>,
    fail_times: Mutex<usize>,
    pub search_calls: Mutex<usize>,
}

impl MockSearchProvider {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            pages: Vec::new(),
            fail_times: Mutex::new(0),
            search_calls: Mutex::new(0),
        }
    }

    pub fn with_pages(mut self, pages: Vec<FetchedPage>) -> Self {
        self.pages = pages;
        self
    }

    /// 前 n 次 search 调用返回错误（测试重试 / 降级路径）
    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_times = Mutex::new(n);
        self
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<SearchHit>, String> {
        *self.search_calls.lock().expect("calls lock") += 1;
        {
            let mut fails = self.fail_times.lock().expect("fail lock");
            if *fails > 0 {
                *fails -= 1;
                return Err("provider down".to_string());
            }
        }
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }

    async fn fetch(&self, url: &str) -> Result<String, String> {
        self.pages
            .iter()
            .find(|p| p.url == url)
            .map(|p| p.content.clone())
            .ok_or_else(|| format!("HTTP 404: {}", url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_tier_escalation_caps_at_deep() {
        assert_eq!(DepthTier::Snippets.escalate(), DepthTier::Selective);
        assert_eq!(DepthTier::Selective.escalate(), DepthTier::Deep);
        assert_eq!(DepthTier::Deep.escalate(), DepthTier::Deep);
    }

    #[test]
    fn test_strip_html_tags() {
        assert_eq!(
            strip_html_tags("<b>Paris</b> is the <i>capital</i>"),
            "Paris is the capital"
        );
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(
            percent_decode("https%3A%2F%2Fexample.com%2Fa"),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_empty_result_context_block() {
        let r = SearchResult::empty("mock", "q", DepthTier::Snippets);
        assert!(r.is_empty());
        assert_eq!(r.as_context_block(), "No search results found.");
    }

    #[test]
    fn test_parse_results_tolerates_garbage() {
        let hits = DuckDuckGoProvider::parse_results("<html><body>nothing here</body></html>", 5);
        assert!(hits.is_empty());
    }
}
