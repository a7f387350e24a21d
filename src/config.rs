//! 設定ファイル管理
//!
//! `~/.config/friday/config.toml` から TOML 形式の設定を読み込む。
//! ファイルが存在しない場合はテンプレートを生成し、デフォルト値を使用する。
//! API キーそのものは設定ファイルに書かず、環境変数名だけを指定する。
//!
//! # 設定ファイル例
//!
//! ```toml
//! [assistant]
//! username = "Tony"
//! name = "Friday"
//!
//! [ai]
//! chat_model = "llama-3.3-70b-versatile"
//!
//! [image]
//! models = ["stabilityai/stable-diffusion-xl-base-1.0"]
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::chain::RetryPolicy;

/// Friday の設定全体
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FridayConfig {
    pub assistant: AssistantConfig,
    pub ai: AiConfig,
    pub chat: ChatConfig,
    pub search: SearchConfig,
    pub image: ImageConfig,
    pub worker: WorkerConfig,
}

/// アシスタントの人格
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// ユーザーの呼び名
    pub username: String,
    /// アシスタント名
    pub name: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            username: std::env::var("USER").unwrap_or_else(|_| "User".to_string()),
            name: "Friday".to_string(),
        }
    }
}

/// 補完 API の設定
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// OpenAI 互換エンドポイント
    pub api_base: String,
    /// API キーを読む環境変数名
    pub api_key_env: String,
    pub classifier_model: String,
    pub chat_model: String,
    /// 主モデル失敗時に使う小さなモデル
    pub fallback_model: String,
    pub content_model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.groq.com/openai/v1".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            classifier_model: "llama-3.3-70b-versatile".to_string(),
            chat_model: "llama-3.3-70b-versatile".to_string(),
            fallback_model: "llama-3.1-8b-instant".to_string(),
            content_model: "llama-3.1-8b-instant".to_string(),
            temperature: 0.7,
            timeout_secs: 30,
        }
    }
}

/// 通常会話の設定
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// 補完に渡す直近ターン数
    pub history_window: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { history_window: 20 }
    }
}

/// リアルタイム検索の設定
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// ダイジェストに含める検索結果数
    pub max_results: usize,
    /// タイトルの最大文字数（省略記号を含む）
    pub title_budget: usize,
    /// 説明文の最大文字数（省略記号を含む）
    pub description_budget: usize,
    /// 補完に渡す直近ターン数
    pub history_window: usize,
    pub brave_api_key_env: String,
    pub brave_base: String,
    pub duckduckgo_base: String,
    pub wikipedia_base: String,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 3,
            title_budget: 100,
            description_budget: 200,
            history_window: 3,
            brave_api_key_env: "BRAVE_API_KEY".to_string(),
            brave_base: "https://api.search.brave.com/res/v1".to_string(),
            duckduckgo_base: "https://html.duckduckgo.com".to_string(),
            wikipedia_base: "https://en.wikipedia.org".to_string(),
            timeout_secs: 30,
        }
    }
}

impl SearchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempt_timeout: Duration::from_secs(self.timeout_secs),
            ..RetryPolicy::default()
        }
    }
}

/// 画像生成の設定
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Hugging Face 推論モデル（優先順）
    pub models: Vec<String>,
    pub inference_base: String,
    pub pollinations_base: String,
    pub api_key_env: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance_scale: f32,
    pub timeout_secs: u64,
    pub retry_delay_ms: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            models: vec![
                "runwayml/stable-diffusion-v1-5".to_string(),
                "stabilityai/stable-diffusion-2-1".to_string(),
                "stabilityai/stable-diffusion-xl-base-1.0".to_string(),
                "CompVis/stable-diffusion-v1-4".to_string(),
            ],
            inference_base: "https://api-inference.huggingface.co/models".to_string(),
            pollinations_base: "https://image.pollinations.ai".to_string(),
            api_key_env: "HUGGINGFACE_API_KEY".to_string(),
            width: 512,
            height: 512,
            steps: 25,
            guidance_scale: 7.5,
            timeout_secs: 30,
            retry_delay_ms: 5000,
        }
    }
}

impl ImageConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            attempt_timeout: Duration::from_secs(self.timeout_secs),
            transient_retries: 1,
        }
    }
}

/// 画像生成ワーカーの設定
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    /// リクエストが来ないまま待つ最大秒数
    pub idle_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            idle_timeout_secs: 300,
        }
    }
}

const TEMPLATE: &str = r#"# Friday configuration
#
# API keys are read from environment variables (or .env).
# Only the variable names are configured here.

[assistant]
# username = "Tony"
# name = "Friday"

[ai]
# api_base = "https://api.groq.com/openai/v1"
# api_key_env = "GROQ_API_KEY"
# classifier_model = "llama-3.3-70b-versatile"
# chat_model = "llama-3.3-70b-versatile"
# fallback_model = "llama-3.1-8b-instant"
# content_model = "llama-3.1-8b-instant"
# temperature = 0.7
# timeout_secs = 30

[chat]
# history_window = 20

[search]
# max_results = 3
# title_budget = 100
# description_budget = 200
# history_window = 3
# brave_api_key_env = "BRAVE_API_KEY"

[image]
# models = ["runwayml/stable-diffusion-v1-5", "stabilityai/stable-diffusion-2-1"]
# api_key_env = "HUGGINGFACE_API_KEY"
# width = 512
# height = 512
# steps = 25
# guidance_scale = 7.5

[worker]
# poll_interval_ms = 1000
# idle_timeout_secs = 300
"#;

impl FridayConfig {
    /// 設定ファイルを読み込む。
    ///
    /// 存在しなければテンプレートを生成してデフォルト値を返す。
    /// パースエラーの場合は警告を表示してデフォルト値を返す。
    pub fn load() -> Self {
        let path = Self::config_path();
        debug!(path = %path.display(), "Loading config file");

        if !path.exists() {
            Self::create_default_config(&path);
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<FridayConfig>(&content) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        chat_model = %config.ai.chat_model,
                        image_models = config.image.models.len(),
                        "Config loaded successfully"
                    );
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    eprintln!("friday: warning: failed to parse config file: {e}");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read config file");
                eprintln!("friday: warning: failed to read config file: {e}");
                Self::default()
            }
        }
    }

    /// 設定ファイルのパス。`$HOME` が取れなければカレントディレクトリ基準。
    pub fn config_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".config/friday/config.toml")
    }

    fn create_default_config(path: &std::path::Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "Failed to create config directory");
                eprintln!("friday: warning: failed to create config directory: {e}");
                return;
            }
        }

        match std::fs::write(path, TEMPLATE) {
            Ok(()) => info!(path = %path.display(), "Created default config file"),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to create default config file");
                eprintln!("friday: warning: failed to create config file: {e}");
            }
        }
    }
}
