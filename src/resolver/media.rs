//! 画像生成 — フォールバックチェーンの画像向け特化
//!
//! Hugging Face の推論モデルを 1 モデル 1 階層として優先順に並べ（要 API キー）、
//! 最後に認証不要の Pollinations を置く。目標枚数は 4 枚固定。
//! 得られた画像は `<整形済みプロンプト><n>.jpg` として保存する。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use rand::Rng;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use super::ensure_success;
use crate::chain::{FallbackChain, ProviderError, ProviderTier};
use crate::config::ImageConfig;

/// 1 リクエストあたりの目標枚数
pub const IMAGE_TARGET: usize = 4;

const FILENAME_LIMIT: usize = 50;

/// 画像生成リクエスト
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
}

pub type ImageChain = FallbackChain<ImageRequest, Vec<u8>>;

/// プロンプトをファイル名に使える形へ整形する。
pub fn clean_filename(prompt: &str) -> String {
    prompt
        .chars()
        .map(|c| match c {
            ' ' | '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .take(FILENAME_LIMIT)
        .collect()
}

fn random_seed() -> u32 {
    rand::rng().random_range(0..1_000_000)
}

/// Hugging Face 推論 API の 1 モデル
pub struct HuggingFaceTier {
    http: reqwest::Client,
    name: String,
    endpoint: String,
    api_key: Option<String>,
    steps: u32,
    guidance_scale: f32,
}

impl HuggingFaceTier {
    pub fn new(
        http: reqwest::Client,
        config: &ImageConfig,
        model: &str,
        api_key: Option<String>,
    ) -> Self {
        Self {
            http,
            name: format!("huggingface:{model}"),
            endpoint: format!("{}/{}", config.inference_base.trim_end_matches('/'), model),
            api_key,
            steps: config.steps,
            guidance_scale: config.guidance_scale,
        }
    }
}

impl ProviderTier<ImageRequest, Vec<u8>> for HuggingFaceTier {
    fn name(&self) -> &str {
        &self.name
    }

    fn budget(&self) -> usize {
        IMAGE_TARGET
    }

    fn requires_credentials(&self) -> bool {
        true
    }

    fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    fn attempt<'a>(
        &'a self,
        request: &'a ImageRequest,
        index: usize,
    ) -> BoxFuture<'a, Result<Vec<u8>, ProviderError>> {
        Box::pin(async move {
            let payload = json!({
                "inputs": format!("{}, high quality, detailed, 4k, masterpiece", request.prompt),
                "parameters": {
                    "seed": random_seed(),
                    "num_inference_steps": self.steps,
                    "guidance_scale": self.guidance_scale,
                }
            });
            debug!(tier = %self.name, index, "Requesting image");

            let response = self
                .http
                .post(&self.endpoint)
                .bearer_auth(self.api_key.as_deref().unwrap_or_default())
                .json(&payload)
                .send()
                .await?;

            // 503 はモデルのロード中
            if response.status().as_u16() == 503 {
                return Err(ProviderError::WarmingUp);
            }
            let bytes = ensure_success(response).await?.bytes().await?;
            if bytes.is_empty() {
                return Err(ProviderError::EmptyPayload);
            }
            Ok(bytes.to_vec())
        })
    }
}

/// Pollinations（認証不要）。残り枚数ぶん 1 枚ずつ問い合わせる。
pub struct PollinationsTier {
    http: reqwest::Client,
    base: String,
    width: u32,
    height: u32,
}

impl PollinationsTier {
    pub fn new(http: reqwest::Client, config: &ImageConfig) -> Self {
        Self {
            http,
            base: config.pollinations_base.clone(),
            width: config.width,
            height: config.height,
        }
    }

    fn url_for(&self, prompt: &str, seed: u32) -> Result<Url, ProviderError> {
        let mut url =
            Url::parse(&self.base).map_err(|e| ProviderError::InvalidPayload(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| {
                ProviderError::InvalidPayload(format!("cannot-be-a-base URL: {}", self.base))
            })?
            .pop_if_empty()
            .push("prompt")
            .push(prompt);
        url.query_pairs_mut()
            .append_pair("seed", &seed.to_string())
            .append_pair("width", &self.width.to_string())
            .append_pair("height", &self.height.to_string())
            .append_pair("enhance", "true");
        Ok(url)
    }
}

impl ProviderTier<ImageRequest, Vec<u8>> for PollinationsTier {
    fn name(&self) -> &str {
        "pollinations"
    }

    fn budget(&self) -> usize {
        IMAGE_TARGET
    }

    fn attempt<'a>(
        &'a self,
        request: &'a ImageRequest,
        index: usize,
    ) -> BoxFuture<'a, Result<Vec<u8>, ProviderError>> {
        Box::pin(async move {
            let url = self.url_for(&request.prompt, random_seed())?;
            debug!(url = %url, index, "Requesting Pollinations image");
            let response = self.http.get(url).send().await?;
            let bytes = ensure_success(response).await?.bytes().await?;
            if bytes.is_empty() {
                return Err(ProviderError::EmptyPayload);
            }
            Ok(bytes.to_vec())
        })
    }
}

/// 画像生成 + 保存
pub struct MediaResolver {
    chain: ImageChain,
    output_dir: PathBuf,
}

impl MediaResolver {
    pub fn new(chain: ImageChain, output_dir: PathBuf) -> Self {
        Self { chain, output_dir }
    }

    /// 標準の画像チェーンを組み立てる。
    pub fn standard_chain(config: &ImageConfig, http: reqwest::Client) -> ImageChain {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        let chain = config.models.iter().fold(
            FallbackChain::new(config.retry_policy()),
            |chain, model| {
                chain.with_tier(HuggingFaceTier::new(http.clone(), config, model, api_key.clone()))
            },
        );
        chain.with_tier(PollinationsTier::new(http, config))
    }

    /// 画像を生成して保存し、保存先のパスを返す。1 枚も得られなければエラー。
    pub async fn generate(&self, prompt: &str) -> Result<Vec<PathBuf>> {
        info!(prompt = %prompt, target = IMAGE_TARGET, "Starting image generation");
        let request = ImageRequest {
            prompt: prompt.to_string(),
        };
        let resolution = self
            .chain
            .resolve(&request, IMAGE_TARGET)
            .await
            .with_context(|| format!("Failed to generate any image for '{prompt}'"))?;

        let paths = save_images(&self.output_dir, prompt, &resolution.units)?;
        info!(prompt = %prompt, saved = paths.len(), "Image generation finished");
        Ok(paths)
    }
}

fn save_images(dir: &Path, prompt: &str, images: &[Vec<u8>]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create image directory: {}", dir.display()))?;
    let stem = clean_filename(prompt);
    images
        .iter()
        .enumerate()
        .map(|(i, bytes)| {
            let path = dir.join(format!("{stem}{}.jpg", i + 1));
            std::fs::write(&path, bytes)
                .with_context(|| format!("failed to write image: {}", path.display()))?;
            Ok(path)
        })
        .collect()
}
