//! リアルタイム検索回答
//!
//! 検索プロバイダをフォールバックチェーン（Brave → DuckDuckGo → Wikipedia）で引き、
//! 上位の結果を文字数上限つきのダイジェストにまとめ、現在日時と直近履歴を添えて
//! 主モデルに回答させる。主モデルが失敗したら小さいモデルで 1 回だけ再試行し、
//! それも失敗したら謝罪文を返す。

use std::sync::Arc;

use chrono::Local;
use futures_util::future::BoxFuture;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::{ensure_success, timestamp_line};
use crate::ai::prompts::{search_system_prompt, SEARCH_ANSWER_INSTRUCTION};
use crate::ai::stream::{strip_eos_marker, tidy_answer};
use crate::ai::{ChatTurn, CompletionBackend, CompletionRequest};
use crate::chain::{FallbackChain, ProviderError, ProviderTier};
use crate::config::{AiConfig, AssistantConfig, SearchConfig};
use crate::storage::SharedSession;

/// 検索は 1 ページ取れれば十分
pub const SEARCH_PAGE_TARGET: usize = 1;

const PRIMARY_MAX_TOKENS: u32 = 1024;
const FALLBACK_MAX_TOKENS: u32 = 512;

/// 検索結果 1 件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub description: String,
    pub source: String,
}

/// 検索クエリ
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub max_results: usize,
}

pub type SearchChain = FallbackChain<SearchQuery, Vec<SearchHit>>;

/// 文字数上限で切り詰める。省略記号は上限に含めるため、結果を再度切り詰めても変わらない。
pub fn truncate_chars(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    if budget < 3 {
        return text.chars().take(budget).collect();
    }
    let mut truncated: String = text.chars().take(budget - 3).collect();
    truncated.push_str("...");
    truncated
}

/// 上位 `max_results` 件をダイジェストにまとめる。
pub fn compose_digest(
    query: &str,
    hits: &[SearchHit],
    max_results: usize,
    title_budget: usize,
    description_budget: usize,
) -> String {
    let mut digest = format!("Search results for {query}:\n");
    if hits.is_empty() {
        digest.push_str("No results found.\n");
        return digest;
    }
    for (i, hit) in hits.iter().take(max_results).enumerate() {
        digest.push_str(&format!(
            "{}. {}\n{}\n\n",
            i + 1,
            truncate_chars(&hit.title, title_budget),
            truncate_chars(&hit.description, description_budget)
        ));
    }
    digest
}

/// 検索 + 回答生成
pub struct SearchResolver {
    backend: Option<Arc<dyn CompletionBackend>>,
    chain: SearchChain,
    session: SharedSession,
    system_prompt: String,
    config: SearchConfig,
    chat_model: String,
    fallback_model: String,
    temperature: f32,
}

impl SearchResolver {
    pub fn new(
        backend: Option<Arc<dyn CompletionBackend>>,
        chain: SearchChain,
        session: SharedSession,
        assistant: &AssistantConfig,
        ai: &AiConfig,
        config: &SearchConfig,
    ) -> Self {
        Self {
            backend,
            chain,
            session,
            system_prompt: search_system_prompt(&assistant.username, &assistant.name),
            config: config.clone(),
            chat_model: ai.chat_model.clone(),
            fallback_model: ai.fallback_model.clone(),
            temperature: ai.temperature,
        }
    }

    /// 標準の検索チェーンを組み立てる。
    pub fn standard_chain(config: &SearchConfig, http: reqwest::Client) -> SearchChain {
        let brave_key = std::env::var(&config.brave_api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        FallbackChain::new(config.retry_policy())
            .with_tier(BraveTier {
                http: http.clone(),
                base: config.brave_base.clone(),
                api_key: brave_key,
            })
            .with_tier(DuckDuckGoTier {
                http: http.clone(),
                base: config.duckduckgo_base.clone(),
            })
            .with_tier(WikipediaTier {
                http,
                base: config.wikipedia_base.clone(),
            })
    }

    /// 検索結果に基づいて回答する。失敗しても謝罪文を返し、エラーにはしない。
    pub async fn answer(&self, query: &str) -> String {
        let hits = self.fetch_hits(query).await;
        let digest = compose_digest(
            query,
            &hits,
            self.config.max_results,
            self.config.title_budget,
            self.config.description_budget,
        );

        let Some(backend) = self.backend.as_ref() else {
            return "Sorry, I encountered an error: AI backend is not configured".to_string();
        };

        match self.primary(backend.as_ref(), query, &digest).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "Primary search answer failed, trying fallback model");
                match self.fallback(backend.as_ref(), query, &digest).await {
                    Ok(answer) => answer,
                    Err(fallback_err) => {
                        warn!(error = %fallback_err, "Fallback search answer failed");
                        format!("Sorry, I encountered an error: {fallback_err}")
                    }
                }
            }
        }
    }

    async fn fetch_hits(&self, query: &str) -> Vec<SearchHit> {
        let request = SearchQuery {
            text: query.to_string(),
            max_results: self.config.max_results,
        };
        match self.chain.resolve(&request, SEARCH_PAGE_TARGET).await {
            Ok(resolution) => resolution.units.into_iter().next().unwrap_or_default(),
            Err(e) => {
                warn!(
                    query = %query,
                    error = %e,
                    "Every search provider failed, answering without results"
                );
                Vec::new()
            }
        }
    }

    async fn primary(
        &self,
        backend: &dyn CompletionBackend,
        query: &str,
        digest: &str,
    ) -> anyhow::Result<String> {
        let history = self.session.lock().await.snapshot(self.config.history_window);
        let system = format!(
            "{}\n\n{}\n\n{}\n\n{}",
            self.system_prompt,
            timestamp_line(Local::now()),
            digest,
            SEARCH_ANSWER_INSTRUCTION
        );

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatTurn::system(system));
        messages.extend(history);
        messages.push(ChatTurn::user(query));

        let raw = backend
            .complete(CompletionRequest {
                model: self.chat_model.clone(),
                messages,
                temperature: self.temperature,
                max_tokens: PRIMARY_MAX_TOKENS,
            })
            .await?;

        let answer = strip_eos_marker(&raw);
        let answer = answer.trim();
        if let Err(e) = self.session.lock().await.commit_exchange(query, answer) {
            warn!(error = %e, "Failed to persist search exchange");
        }
        info!(query = %query, answer_length = answer.len(), "Search answer generated");
        Ok(tidy_answer(answer))
    }

    async fn fallback(
        &self,
        backend: &dyn CompletionBackend,
        query: &str,
        digest: &str,
    ) -> anyhow::Result<String> {
        let messages = vec![
            ChatTurn::system(format!("{}\n{}", self.system_prompt, digest)),
            ChatTurn::user(query),
        ];
        let raw = backend
            .complete(CompletionRequest {
                model: self.fallback_model.clone(),
                messages,
                temperature: self.temperature,
                max_tokens: FALLBACK_MAX_TOKENS,
            })
            .await?;
        Ok(tidy_answer(&raw))
    }
}

// ========== 検索プロバイダ ==========

/// Brave Search API（要 API キー）
pub struct BraveTier {
    http: reqwest::Client,
    base: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Deserialize)]
struct BraveResult {
    title: String,
    #[serde(default)]
    description: String,
    url: String,
}

impl ProviderTier<SearchQuery, Vec<SearchHit>> for BraveTier {
    fn name(&self) -> &str {
        "brave"
    }

    fn budget(&self) -> usize {
        1
    }

    fn requires_credentials(&self) -> bool {
        true
    }

    fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    fn attempt<'a>(
        &'a self,
        request: &'a SearchQuery,
        _index: usize,
    ) -> BoxFuture<'a, Result<Vec<SearchHit>, ProviderError>> {
        Box::pin(async move {
            let url = format!("{}/web/search", self.base.trim_end_matches('/'));
            let count = request.max_results.to_string();
            let response = self
                .http
                .get(url)
                .query(&[("q", request.text.as_str()), ("count", count.as_str())])
                .header("Accept", "application/json")
                .header("X-Subscription-Token", self.api_key.as_deref().unwrap_or_default())
                .send()
                .await?;
            let body: BraveResponse = ensure_success(response).await?.json().await?;

            let hits: Vec<SearchHit> = body
                .web
                .map(|web| web.results)
                .unwrap_or_default()
                .into_iter()
                .map(|r| SearchHit {
                    title: strip_markup(&r.title),
                    description: strip_markup(&r.description),
                    source: r.url,
                })
                .collect();
            non_empty(hits)
        })
    }
}

/// DuckDuckGo HTML 版（認証不要）
pub struct DuckDuckGoTier {
    http: reqwest::Client,
    base: String,
}

impl ProviderTier<SearchQuery, Vec<SearchHit>> for DuckDuckGoTier {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    fn budget(&self) -> usize {
        1
    }

    fn attempt<'a>(
        &'a self,
        request: &'a SearchQuery,
        _index: usize,
    ) -> BoxFuture<'a, Result<Vec<SearchHit>, ProviderError>> {
        Box::pin(async move {
            let url = format!("{}/html/", self.base.trim_end_matches('/'));
            let response = self
                .http
                .get(url)
                .query(&[("q", request.text.as_str())])
                .send()
                .await?;
            let html = ensure_success(response).await?.text().await?;
            non_empty(parse_duckduckgo_html(&html, request.max_results))
        })
    }
}

/// DuckDuckGo の HTML 結果ページを解析する。
pub fn parse_duckduckgo_html(html: &str, max_results: usize) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let (Ok(result_sel), Ok(title_sel), Ok(snippet_sel)) = (
        Selector::parse(".result"),
        Selector::parse(".result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    document
        .select(&result_sel)
        .filter_map(|result| {
            let link = result.select(&title_sel).next()?;
            let title = collapse_whitespace(&link.text().collect::<String>());
            if title.is_empty() {
                return None;
            }
            let description = result
                .select(&snippet_sel)
                .next()
                .map(|s| collapse_whitespace(&s.text().collect::<String>()))
                .unwrap_or_default();
            let source = link.value().attr("href").unwrap_or_default().to_string();
            Some(SearchHit {
                title,
                description,
                source,
            })
        })
        .take(max_results)
        .collect()
}

/// Wikipedia 検索 API（認証不要）
pub struct WikipediaTier {
    http: reqwest::Client,
    base: String,
}

#[derive(Deserialize)]
struct WikiResponse {
    query: Option<WikiQuery>,
}

#[derive(Deserialize)]
struct WikiQuery {
    #[serde(default)]
    search: Vec<WikiPage>,
}

#[derive(Deserialize)]
struct WikiPage {
    title: String,
    #[serde(default)]
    snippet: String,
}

impl ProviderTier<SearchQuery, Vec<SearchHit>> for WikipediaTier {
    fn name(&self) -> &str {
        "wikipedia"
    }

    fn budget(&self) -> usize {
        1
    }

    fn attempt<'a>(
        &'a self,
        request: &'a SearchQuery,
        _index: usize,
    ) -> BoxFuture<'a, Result<Vec<SearchHit>, ProviderError>> {
        Box::pin(async move {
            let base = self.base.trim_end_matches('/');
            let limit = request.max_results.to_string();
            let response = self
                .http
                .get(format!("{base}/w/api.php"))
                .query(&[
                    ("action", "query"),
                    ("list", "search"),
                    ("format", "json"),
                    ("srsearch", request.text.as_str()),
                    ("srlimit", limit.as_str()),
                ])
                .send()
                .await?;
            let body: WikiResponse = ensure_success(response).await?.json().await?;

            let hits: Vec<SearchHit> = body
                .query
                .map(|q| q.search)
                .unwrap_or_default()
                .into_iter()
                .map(|page| {
                    let source = Url::parse(base)
                        .and_then(|u| u.join(&format!("/wiki/{}", page.title.replace(' ', "_"))))
                        .map(|u| u.to_string())
                        .unwrap_or_default();
                    SearchHit {
                        description: strip_markup(&page.snippet),
                        title: page.title,
                        source,
                    }
                })
                .collect();
            non_empty(hits)
        })
    }
}

fn non_empty(hits: Vec<SearchHit>) -> Result<Vec<SearchHit>, ProviderError> {
    if hits.is_empty() {
        return Err(ProviderError::EmptyPayload);
    }
    debug!(hits = hits.len(), "Search provider returned hits");
    Ok(hits)
}

/// HTML 断片からテキストだけを取り出す。
fn strip_markup(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    collapse_whitespace(&parsed.root_element().text().collect::<String>())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
