//! 评估：反思评分 + 外部证据 + 自洽性的加权合成
//!
//! score = w_r·reflection + w_e·external + w_c·consistency，夹取到 [0,1]。
//! 权重可配置（不同资料对系数并无定论）；默认外部证据权重最高，无佐证的
//! 自评分数已知不可靠。没有外部证据时把 w_e 按比例摊给其余两项。
//! 模型评分输出非法时该分量记 0.0 并留日志，单次坏生成不会中断搜索。

use std::sync::Arc;

use serde::Deserialize;

use crate::core::EngineError;
use crate::llm::{LlmClient, Message};
use crate::mcts::markers::visible_text;
use crate::mcts::prompts::RATE_SYSTEM_PROMPT;
use crate::tools::SearchResult;

/// 三路权重（[mcts.weights] 段）
#[derive(Debug, Clone, Deserialize)]
pub struct Weights {
    #[serde(default = "default_w_reflection")]
    pub reflection: f64,
    #[serde(default = "default_w_external")]
    pub external: f64,
    #[serde(default = "default_w_consistency")]
    pub consistency: f64,
}

fn default_w_reflection() -> f64 {
    0.3
}

fn default_w_external() -> f64 {
    0.5
}

fn default_w_consistency() -> f64 {
    0.2
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            reflection: default_w_reflection(),
            external: default_w_external(),
            consistency: default_w_consistency(),
        }
    }
}

/// 一次评估的完整产出；score 为合成标量，其余供终止判定与深度升级使用
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub score: f64,
    pub reflection_score: f64,
    pub external_score: f64,
    pub consistency_score: f64,
    /// 完整性子信号（终止判定用）
    pub completeness: f64,
    /// 评估认为信息仍不足（深度升级用）
    pub info_insufficient: bool,
}

pub struct Evaluator {
    llm: Arc<dyn LlmClient>,
    weights: Weights,
    temperature: f32,
}

/// 内容的「重要词项」：小写、长度 > 3、去重
fn significant_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 3)
        .map(String::from)
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

/// 外部支持度：节点可见文本的词项被摘要/正文覆盖的比例；无工具结果为 0
pub fn external_support(content: &str, results: &[SearchResult]) -> f64 {
    if results.iter().all(|r| r.is_empty()) {
        return 0.0;
    }
    let claims = visible_text(content);
    let claim_source = if claims.is_empty() { content } else { &claims };
    let terms = significant_terms(claim_source);
    if terms.is_empty() {
        return 0.0;
    }

    let mut evidence = String::new();
    for r in results {
        for h in &r.hits {
            evidence.push_str(&h.snippet.to_lowercase());
            evidence.push(' ');
        }
        for p in &r.pages {
            evidence.push_str(&p.content.to_lowercase());
            evidence.push(' ');
        }
    }

    let supported = terms.iter().filter(|t| evidence.contains(t.as_str())).count();
    (supported as f64 / terms.len() as f64).clamp(0.0, 1.0)
}

/// 自洽性：多次独立反思评分的一致程度（1 - 2·标准差，夹取 [0,1]）；样本不足为 0
fn consistency_of(scores: &[f64]) -> f64 {
    if scores.len() < 2 {
        return 0.0;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
    (1.0 - 2.0 * var.sqrt()).clamp(0.0, 1.0)
}

impl Evaluator {
    pub fn new(llm: Arc<dyn LlmClient>, weights: Weights) -> Self {
        Self {
            llm,
            weights,
            temperature: 0.1,
        }
    }

    /// 让模型给反思文本打分（约束 JSON）；非法输出 → (0.0, 0.0)
    async fn rate_reflection(&self, query: &str, reflection: &str) -> (f64, f64) {
        let prompt = format!(
            "Original question: {}\n\nCritique of the trajectory:\n{}\n\nRespond with JSON.",
            query, reflection
        );
        let messages = vec![Message::system(RATE_SYSTEM_PROMPT), Message::user(prompt)];

        let value = match self.llm.complete_json(&messages, self.temperature).await {
            Ok(Some(v)) => v,
            Ok(None) => {
                let err = EngineError::MalformedScore("no JSON object in rating output".to_string());
                tracing::warn!(error = %err, "defaulting to 0.0");
                return (0.0, 0.0);
            }
            Err(e) => {
                tracing::warn!(error = %e, "rating call failed, defaulting to 0.0");
                return (0.0, 0.0);
            }
        };

        let score = extract_number(&value, "score").unwrap_or_else(|| {
            tracing::warn!("score field missing or malformed, defaulting to 0.0");
            0.0
        });
        let completeness = extract_number(&value, "completeness").unwrap_or(score);

        (
            (score / 10.0).clamp(0.0, 1.0),
            (completeness / 10.0).clamp(0.0, 1.0),
        )
    }

    /// 综合评估。extra_reflections 为同一轨迹的额外独立反思（自洽性采样），
    /// 不采样时传空。同一输入组合的重复评估产生相同分数。
    pub async fn evaluate(
        &self,
        query: &str,
        content: &str,
        reflection: &str,
        tool_results: &[SearchResult],
        extra_reflections: &[String],
    ) -> Evaluation {
        let (reflection_score, completeness) = self.rate_reflection(query, reflection).await;

        let external_score = external_support(content, tool_results);

        let consistency_score = if extra_reflections.is_empty() {
            0.0
        } else {
            let mut samples = vec![reflection_score];
            for extra in extra_reflections {
                let (s, _) = self.rate_reflection(query, extra).await;
                samples.push(s);
            }
            consistency_of(&samples)
        };

        // 无外部证据：把 w_e 按比例摊给另外两项
        let w = &self.weights;
        let (w_r, w_e, w_c) = if external_score > 0.0 {
            (w.reflection, w.external, w.consistency)
        } else {
            let rest = w.reflection + w.consistency;
            if rest > 0.0 {
                (
                    w.reflection + w.external * w.reflection / rest,
                    0.0,
                    w.consistency + w.external * w.consistency / rest,
                )
            } else {
                (1.0, 0.0, 0.0)
            }
        };

        let score = (w_r * reflection_score + w_e * external_score + w_c * consistency_score)
            .clamp(0.0, 1.0);

        Evaluation {
            score,
            reflection_score,
            external_score,
            consistency_score,
            completeness,
            info_insufficient: completeness < 0.5,
        }
    }
}

/// 从 JSON 值中提取数值字段，容忍字符串形式的数字
fn extract_number(value: &serde_json::Value, field: &str) -> Option<f64> {
    let v = value.get(field)?;
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    if let Some(s) = v.as_str() {
        // 模型偶尔把数字写成字符串甚至带单位，取第一个数
        let re = regex::Regex::new(r"(\d+(\.\d+)?)").ok()?;
        return re.captures(s)?.get(1)?.as_str().parse().ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::tools::{DepthTier, SearchHit};

    fn paris_result() -> SearchResult {
        SearchResult {
            provider: "mock".to_string(),
            query: "capital of France".to_string(),
            hits: vec![SearchHit {
                title: "Paris - Wikipedia".to_string(),
                url: "https://en.wikipedia.org/wiki/Paris".to_string(),
                snippet: "Paris is the capital of France, population 2.1 million.".to_string(),
            }],
            depth_tier: DepthTier::Snippets,
            pages: Vec::new(),
        }
    }

    #[test]
    fn test_external_support_zero_without_results() {
        assert_eq!(external_support("Paris is the capital", &[]), 0.0);
    }

    #[test]
    fn test_external_support_positive_with_matching_snippet() {
        let s = external_support("The capital of France is Paris", &[paris_result()]);
        assert!(s > 0.0);
    }

    #[tokio::test]
    async fn test_score_clamped_with_malformed_rating() {
        let llm = Arc::new(MockLlmClient::new().with_rule("scoring", vec!["utter nonsense"]));
        let eval = Evaluator::new(llm, Weights::default());
        let e = eval.evaluate("q", "content", "critique", &[], &[]).await;
        assert_eq!(e.reflection_score, 0.0);
        assert!((0.0..=1.0).contains(&e.score));
    }

    #[tokio::test]
    async fn test_score_clamped_with_out_of_range_rating() {
        let llm = Arc::new(
            MockLlmClient::new().with_rule("scoring", vec![r#"{"score": 999, "completeness": -5}"#]),
        );
        let eval = Evaluator::new(llm, Weights::default());
        let e = eval.evaluate("q", "content", "critique", &[], &[]).await;
        assert!((0.0..=1.0).contains(&e.score));
        assert!((0.0..=1.0).contains(&e.reflection_score));
        assert!((0.0..=1.0).contains(&e.completeness));
    }

    #[tokio::test]
    async fn test_evaluation_is_idempotent() {
        let llm = Arc::new(
            MockLlmClient::new()
                .with_rule("scoring", vec![r#"{"score": 7, "completeness": 8}"#]),
        );
        let eval = Evaluator::new(llm, Weights::default());
        let results = vec![paris_result()];
        let first = eval
            .evaluate("q", "The capital of France is Paris", "fine", &results, &[])
            .await;
        let second = eval
            .evaluate("q", "The capital of France is Paris", "fine", &results, &[])
            .await;
        assert_eq!(first.score, second.score);
    }

    #[tokio::test]
    async fn test_weight_redistribution_without_evidence() {
        let llm = Arc::new(
            MockLlmClient::new().with_rule("scoring", vec![r#"{"score": 10, "completeness": 10}"#]),
        );
        let eval = Evaluator::new(llm, Weights::default());
        // 无外部证据、无自洽采样：w_e 应摊给 reflection 与 consistency，
        // consistency 为 0，所以合成分 = 摊派后的 w_r · 1.0
        let e = eval.evaluate("q", "content", "critique", &[], &[]).await;
        let w = Weights::default();
        let expected = w.reflection + w.external * w.reflection / (w.reflection + w.consistency);
        assert!((e.score - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_consistency_zero_with_single_sample() {
        let llm = Arc::new(
            MockLlmClient::new().with_rule("scoring", vec![r#"{"score": 6, "completeness": 6}"#]),
        );
        let eval = Evaluator::new(llm, Weights::default());
        let e = eval.evaluate("q", "content", "critique", &[], &[]).await;
        assert_eq!(e.consistency_score, 0.0);
    }

    #[tokio::test]
    async fn test_consistency_high_when_samples_agree() {
        let llm = Arc::new(
            MockLlmClient::new().with_rule("scoring", vec![r#"{"score": 7, "completeness": 7}"#]),
        );
        let eval = Evaluator::new(llm, Weights::default());
        let extras = vec!["another critique".to_string()];
        let e = eval.evaluate("q", "content", "critique", &[], &extras).await;
        // 两次评分相同 → 一致性为 1
        assert!((e.consistency_score - 1.0).abs() < 1e-9);
    }
}
