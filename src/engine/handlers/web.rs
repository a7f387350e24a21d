//! ブラウザで開く系のハンドラ（Google 検索・YouTube 検索・動画再生）

use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use regex::Regex;
use tracing::{info, warn};
use url::Url;

use super::Launcher;
use crate::engine::command::Command;
use crate::engine::dispatch::CommandHandler;

const GOOGLE_BASE: &str = "https://www.google.com";
const YOUTUBE_BASE: &str = "https://www.youtube.com";

static VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:"videoId":"|watch\?v=)([A-Za-z0-9_-]{11})"#).expect("invalid video id pattern")
});

/// 検索結果ページの URL を組み立てる。
fn search_url(base: &str, path: &str, param: &str, query: &str) -> Result<Url> {
    let mut url = Url::parse(base)
        .and_then(|base| base.join(path))
        .with_context(|| format!("invalid search base URL: {base}"))?;
    url.query_pairs_mut().append_pair(param, query.trim());
    Ok(url)
}

/// YouTube の検索結果 HTML から最初の動画 ID を取り出す。
pub fn first_video_id(html: &str) -> Option<&str> {
    VIDEO_ID
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub struct WebSearchHandler {
    launcher: Arc<dyn Launcher>,
}

impl WebSearchHandler {
    pub fn new(launcher: Arc<dyn Launcher>) -> Self {
        Self { launcher }
    }
}

impl CommandHandler for WebSearchHandler {
    fn handle<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let url = search_url(GOOGLE_BASE, "/search", "q", &command.argument)?;
            info!(url = %url, "Opening Google search");
            self.launcher.open(url.as_str())?;
            Ok(format!("Searched Google for {}", command.argument.trim()))
        })
    }
}

pub struct VideoSearchHandler {
    launcher: Arc<dyn Launcher>,
}

impl VideoSearchHandler {
    pub fn new(launcher: Arc<dyn Launcher>) -> Self {
        Self { launcher }
    }
}

impl CommandHandler for VideoSearchHandler {
    fn handle<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let url = search_url(YOUTUBE_BASE, "/results", "search_query", &command.argument)?;
            info!(url = %url, "Opening YouTube search");
            self.launcher.open(url.as_str())?;
            Ok(format!("Searched YouTube for {}", command.argument.trim()))
        })
    }
}

/// 最初の検索結果を再生する。取れなければ検索結果ページを開く。
pub struct PlayMediaHandler {
    http: reqwest::Client,
    launcher: Arc<dyn Launcher>,
    base: String,
}

impl PlayMediaHandler {
    pub fn new(http: reqwest::Client, launcher: Arc<dyn Launcher>) -> Self {
        Self::with_base(http, launcher, YOUTUBE_BASE)
    }

    pub fn with_base(http: reqwest::Client, launcher: Arc<dyn Launcher>, base: &str) -> Self {
        Self {
            http,
            launcher,
            base: base.to_string(),
        }
    }

    async fn resolve_video(&self, results: &Url) -> Result<Url> {
        let html = self
            .http
            .get(results.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let id = first_video_id(&html).context("no video found in search results")?;
        search_url(&self.base, "/watch", "v", id)
    }
}

impl CommandHandler for PlayMediaHandler {
    fn handle<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let query = command.argument.trim();
            let results = search_url(&self.base, "/results", "search_query", query)?;
            match self.resolve_video(&results).await {
                Ok(video) => {
                    info!(query = %query, url = %video, "Playing first result");
                    self.launcher.open(video.as_str())?;
                    Ok(format!("Playing {query}"))
                }
                Err(e) => {
                    warn!(
                        query = %query,
                        error = %e,
                        "Could not resolve a video, opening results page"
                    );
                    self.launcher.open(results.as_str())?;
                    Ok(format!("Opened YouTube results for {query}"))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command::CommandKind;
    use crate::engine::handlers::testing::RecordingLauncher;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn search_urls_are_encoded() {
        let url = search_url(GOOGLE_BASE, "/search", "q", " rust & tokio ").unwrap();
        assert_eq!(url.as_str(), "https://www.google.com/search?q=rust+%26+tokio");
    }

    #[test]
    fn video_id_is_taken_from_first_match() {
        let html = r#"x "videoId":"dQw4w9WgXcQ" y "videoId":"aaaaaaaaaaa""#;
        assert_eq!(first_video_id(html), Some("dQw4w9WgXcQ"));
        assert_eq!(first_video_id("/watch?v=abcdefghijk&t=1"), Some("abcdefghijk"));
        assert_eq!(first_video_id("no videos"), None);
    }

    #[tokio::test]
    async fn google_search_opens_results() {
        let launcher = Arc::new(RecordingLauncher::default());
        let command = Command::new(CommandKind::WebSearch, "python programming");
        WebSearchHandler::new(launcher.clone()).handle(&command).await.unwrap();
        assert_eq!(
            launcher.opened(),
            vec!["https://www.google.com/search?q=python+programming"]
        );
    }

    #[tokio::test]
    async fn youtube_search_opens_results() {
        let launcher = Arc::new(RecordingLauncher::default());
        let command = Command::new(CommandKind::VideoSearch, "lofi");
        VideoSearchHandler::new(launcher.clone()).handle(&command).await.unwrap();
        assert_eq!(
            launcher.opened(),
            vec!["https://www.youtube.com/results?search_query=lofi"]
        );
    }

    #[tokio::test]
    async fn play_opens_first_video() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/results"))
            .and(query_param("search_query", "afsanay"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"videoId":"ABCDEFGHIJK"}"#),
            )
            .mount(&server)
            .await;

        let launcher = Arc::new(RecordingLauncher::default());
        let handler =
            PlayMediaHandler::with_base(reqwest::Client::new(), launcher.clone(), &server.uri());
        let message = handler
            .handle(&Command::new(CommandKind::PlayMedia, "afsanay"))
            .await
            .unwrap();

        assert_eq!(message, "Playing afsanay");
        assert_eq!(launcher.opened(), vec![format!("{}/watch?v=ABCDEFGHIJK", server.uri())]);
    }

    #[tokio::test]
    async fn play_falls_back_to_results_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let launcher = Arc::new(RecordingLauncher::default());
        let handler =
            PlayMediaHandler::with_base(reqwest::Client::new(), launcher.clone(), &server.uri());
        handler
            .handle(&Command::new(CommandKind::PlayMedia, "some song"))
            .await
            .unwrap();

        assert_eq!(
            launcher.opened(),
            vec![format!("{}/results?search_query=some+song", server.uri())]
        );
    }
}
