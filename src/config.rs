//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ARBOR__*` 覆盖（双下划线表示嵌套，
//! 如 `ARBOR__LLM__PROVIDER=openai`、`ARBOR__MCTS__SEARCH_BUDGET=8`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::mcts::Weights;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub mcts: MctsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择、采样温度与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：ollama / openai / deepseek / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "deepseek-r1:14b".to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.7,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 非流式请求超时（秒）
    pub request: u64,
    /// 流式生成整体超时（秒）
    pub stream: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: 60,
            stream: 120,
        }
    }
}

/// [search] 段：检索提供方、超时与结果大小
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// 提供方：duckduckgo / mock
    pub provider: String,
    pub timeout_secs: u64,
    /// 单次查询取回的最大结果数
    pub max_results: usize,
    /// 单页抓取正文的最大字符数
    pub max_page_chars: usize,
    /// 查询结果缓存的 TTL（秒）
    pub cache_ttl_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            provider: "duckduckgo".to_string(),
            timeout_secs: 15,
            max_results: 5,
            max_page_chars: 3000,
            cache_ttl_secs: 600,
        }
    }
}

/// [mcts] 段：预算、UCT 参数、分支与终止阈值
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MctsSection {
    /// 检索预算：主循环最多跑多少圈
    pub search_budget: u32,
    pub max_depth: usize,
    /// UCT 探索常数 c
    pub exploration: f64,
    /// 回传衰减因子
    pub gamma: f64,
    pub default_branching: usize,
    /// 兄弟价值分歧大时的分支数
    pub explore_branching: usize,
    /// 深层节点的分支数
    pub exploit_branching: usize,
    pub variance_threshold: f64,
    pub depth_threshold: usize,
    /// 自洽性采样次数（1 = 不采样）
    pub consistency_samples: usize,
    /// 终止判定的完整性阈值
    pub completeness_threshold: f64,
    /// 简单问题绕过树搜索的快速通道
    pub fast_path: bool,
    #[serde(default)]
    pub weights: Weights,
}

impl Default for MctsSection {
    fn default() -> Self {
        Self {
            search_budget: 5,
            max_depth: 8,
            exploration: 1.4,
            gamma: 0.9,
            default_branching: 3,
            explore_branching: 5,
            exploit_branching: 2,
            variance_threshold: 0.3,
            depth_threshold: 3,
            consistency_samples: 1,
            completeness_threshold: 0.8,
            fast_path: false,
            weights: Weights::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            search: SearchSection::default(),
            mcts: MctsSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 ARBOR__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ARBOR__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ARBOR")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}
