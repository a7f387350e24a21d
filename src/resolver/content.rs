//! 文章作成（手紙・エッセイ・コードなど）

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::ai::prompts::content_writer_prompt;
use crate::ai::stream::strip_eos_marker;
use crate::ai::{ChatTurn, CompletionBackend, CompletionRequest};
use crate::config::{AiConfig, AssistantConfig};

const CONTENT_MAX_TOKENS: u32 = 2048;

/// ファイル名に使う題材の最大文字数
const SLUG_LIMIT: usize = 50;

const SLUG_STRIP: &[char] = &[',', '.', '/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// 保存用のファイル名（拡張子なし）を作る。
pub fn content_slug(topic: &str) -> String {
    let slug: String = topic
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !SLUG_STRIP.contains(c))
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .take(SLUG_LIMIT)
        .collect();
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "content".to_string()
    } else {
        slug.to_string()
    }
}

/// 発話から "content" という語を取り除き、題材だけを残す。
fn topic_of(argument: &str) -> String {
    argument
        .split_whitespace()
        .filter(|w| !w.eq_ignore_ascii_case("content"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct ContentWriter {
    backend: Option<Arc<dyn CompletionBackend>>,
    system_prompt: String,
    model: String,
    temperature: f32,
    output_dir: PathBuf,
}

impl ContentWriter {
    pub fn new(
        backend: Option<Arc<dyn CompletionBackend>>,
        assistant: &AssistantConfig,
        ai: &AiConfig,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            backend,
            system_prompt: content_writer_prompt(&assistant.username),
            model: ai.content_model.clone(),
            temperature: ai.temperature,
            output_dir,
        }
    }

    /// 文章を生成してファイルに保存し、そのパスを返す。
    pub async fn write(&self, argument: &str) -> Result<PathBuf> {
        let backend = self
            .backend
            .as_ref()
            .context("AI backend is not configured")?;
        let topic = topic_of(argument);
        debug!(topic = %topic, "Requesting content");

        let raw = backend
            .complete(CompletionRequest {
                model: self.model.clone(),
                messages: vec![
                    ChatTurn::system(self.system_prompt.as_str()),
                    ChatTurn::user(topic.as_str()),
                ],
                temperature: self.temperature,
                max_tokens: CONTENT_MAX_TOKENS,
            })
            .await
            .with_context(|| format!("Content generation failed for '{topic}'"))?;

        let path = save_content(&self.output_dir, &topic, strip_eos_marker(&raw).trim())?;
        info!(path = %path.display(), "Content saved");
        Ok(path)
    }
}

fn save_content(dir: &Path, topic: &str, text: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create content directory: {}", dir.display()))?;
    let path = dir.join(format!("{}.txt", content_slug(topic)));
    std::fs::write(&path, text)
        .with_context(|| format!("failed to write content: {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedBackend;
    use tempfile::TempDir;

    #[test]
    fn slug_is_filesystem_safe() {
        assert_eq!(
            content_slug("Application for Sick Leave."),
            "application_for_sick_leave"
        );
        assert_eq!(content_slug("a poem, about/rain"), "a_poem_aboutrain");
        assert_eq!(content_slug("  "), "content");
    }

    #[test]
    fn long_topic_slug_is_capped() {
        let slug = content_slug(&"essay about the history of programming languages ".repeat(8));
        assert_eq!(slug.chars().count(), SLUG_LIMIT);
        assert!(slug.starts_with("essay_about_the_history"));
        assert_eq!(content_slug("a b"), "a_b");
        // 切り詰めた末尾の区切りは残さない
        assert_eq!(content_slug(&format!("{} rest", "x".repeat(49))), "x".repeat(49));
    }

    #[test]
    fn topic_drops_the_word_content() {
        assert_eq!(topic_of("content essay on rust"), "essay on rust");
        assert_eq!(topic_of("Content   letter"), "letter");
    }

    #[tokio::test]
    async fn writes_generated_text_to_slug_file() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::new([Ok("Dear manager,\nI am unwell.</s>")]));
        let writer = ContentWriter::new(
            Some(backend.clone()),
            &AssistantConfig::default(),
            &AiConfig::default(),
            tmp.path().join("content"),
        );

        let path = writer.write("content letter to manager").await.unwrap();

        assert_eq!(path, tmp.path().join("content").join("letter_to_manager.txt"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Dear manager,\nI am unwell.");

        let request = &backend.requests()[0];
        assert_eq!(request.max_tokens, 2048);
        assert_eq!(request.model, AiConfig::default().content_model);
        assert_eq!(request.messages[1], ChatTurn::user("letter to manager"));
        assert!(request.messages[0].content.contains("content writer"));
    }

    #[tokio::test]
    async fn long_topic_is_still_saved() {
        let tmp = TempDir::new().unwrap();
        let writer = ContentWriter::new(
            Some(Arc::new(ScriptedBackend::new([Ok("A long essay.")]))),
            &AssistantConfig::default(),
            &AiConfig::default(),
            tmp.path().join("content"),
        );
        let topic = format!("content {}", "essay about compilers and language models ".repeat(8));

        let path = writer.write(&topic).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "A long essay.");
        let stem = path.file_stem().unwrap().to_string_lossy().to_string();
        assert!(stem.chars().count() <= SLUG_LIMIT);
    }

    #[tokio::test]
    async fn backend_failure_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let writer = ContentWriter::new(
            Some(Arc::new(ScriptedBackend::new([Err("down")]))),
            &AssistantConfig::default(),
            &AiConfig::default(),
            tmp.path().join("content"),
        );
        assert!(writer.write("essay").await.is_err());
        assert!(!tmp.path().join("content").exists());
    }
}
