//! OpenAI 互換 API クライアント — F.R.I.D.A.Y. Brain
//!
//! Groq などの OpenAI 互換エンドポイントにチャット補完を要求し、
//! ストリーミングで受け取ったデルタを連結して全文を返す。

use std::time::Duration;

use anyhow::{Context, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use super::stream::collect_text;
use super::types::{ChatTurn, CompletionBackend, CompletionRequest, Role};
use crate::config::AiConfig;

/// F.R.I.D.A.Y. AI クライアント
pub struct FridayAI {
    client: Client<OpenAIConfig>,
    timeout: Duration,
}

impl FridayAI {
    /// 設定で指定された環境変数から API キーを読み取り、クライアントを初期化する。
    pub fn new(config: &AiConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).with_context(|| {
            format!("{} is not set. AI features are disabled.", config.api_key_env)
        })?;

        if api_key.trim().is_empty() || api_key.starts_with("your_") {
            anyhow::bail!(
                "{} is not configured. Please set a valid API key in .env",
                config.api_key_env
            );
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.api_base);
        let client = Client::with_config(openai_config).with_http_client(http);

        debug!(
            api_base = %config.api_base,
            timeout_secs = config.timeout_secs,
            "AI client initialized"
        );
        Ok(Self { client, timeout })
    }

    async fn stream_completion(&self, request: CompletionRequest) -> Result<String> {
        let messages = request
            .messages
            .iter()
            .map(to_openai_message)
            .collect::<Result<Vec<_>>>()?;

        debug!(
            model = %request.model,
            message_count = messages.len(),
            temperature = request.temperature,
            max_tokens = request.max_tokens,
            "Sending completion request"
        );

        let openai_request = CreateChatCompletionRequestArgs::default()
            .model(request.model.as_str())
            .messages(messages)
            .temperature(request.temperature)
            .max_completion_tokens(request.max_tokens)
            .stream(true)
            .build()
            .context("Failed to build completion request")?;

        let stream = self
            .client
            .chat()
            .create_stream(openai_request)
            .await
            .context("Failed to create chat stream")?;

        let deltas = stream.map(|chunk| {
            chunk.map(|response| {
                response
                    .choices
                    .into_iter()
                    .filter_map(|choice| choice.delta.content)
                    .collect::<String>()
            })
        });

        let text = collect_text(deltas).await?;
        if text.trim().is_empty() {
            warn!(model = %request.model, "AI returned empty response");
        } else {
            info!(model = %request.model, response_length = text.len(), "AI response received");
        }
        Ok(text)
    }
}

impl CompletionBackend for FridayAI {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let model = request.model.clone();
            tokio::time::timeout(self.timeout, self.stream_completion(request))
                .await
                .with_context(|| format!("Completion request to {model} timed out"))?
        })
    }
}

fn to_openai_message(turn: &ChatTurn) -> Result<ChatCompletionRequestMessage> {
    let message: ChatCompletionRequestMessage = match turn.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(turn.content.as_str())
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(turn.content.as_str())
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(turn.content.as_str())
            .build()?
            .into(),
    };
    Ok(message)
}
