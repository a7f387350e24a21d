use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use reedline::{Color, Prompt, PromptEditMode, PromptHistorySearch, PromptHistorySearchStatus};

use super::color::{cyan, green, magenta, red, white};

/// Friday のプロンプト。
///
/// ```text
/// ✔︎ tony → friday
/// ❯
/// ```
///
/// 直前の発話でいずれかのコマンドが失敗していれば ✗ を表示する。
pub struct FridayPrompt {
    username: String,
    assistant: String,
    /// 直前の発話に失敗が含まれたか。REPL ループから共有される。
    last_failed: Arc<AtomicBool>,
}

impl FridayPrompt {
    pub fn new(username: &str, assistant: &str, last_failed: Arc<AtomicBool>) -> Self {
        Self {
            username: username.to_lowercase(),
            assistant: assistant.to_lowercase(),
            last_failed,
        }
    }
}

impl Prompt for FridayPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        let mark = if self.last_failed.load(Ordering::Relaxed) {
            red("\u{2717}")
        } else {
            cyan("\u{2714}\u{fe0e}")
        };
        Cow::Owned(format!(
            "{mark} {} \u{2192} {}\n",
            cyan(&self.username),
            magenta(&self.assistant)
        ))
    }

    fn get_prompt_color(&self) -> Color {
        Color::White
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        let now = Local::now().format("%H:%M:%S").to_string();
        Cow::Owned(white(&now))
    }

    fn render_prompt_indicator(&self, _edit_mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Owned(green("\u{276f} "))
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed(" :: ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "(failed) ",
        };
        Cow::Owned(format!("{prefix}(search: '{}') ", history_search.term))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_prompt_reflects_last_failure() {
        let failed = Arc::new(AtomicBool::new(false));
        let prompt = FridayPrompt::new("Tony", "Friday", Arc::clone(&failed));

        let ok = prompt.render_prompt_left().to_string();
        assert!(ok.contains("tony"));
        assert!(ok.contains("friday"));
        assert!(ok.contains('\u{2714}'));

        failed.store(true, Ordering::Relaxed);
        assert!(prompt.render_prompt_left().contains('\u{2717}'));
    }
}
