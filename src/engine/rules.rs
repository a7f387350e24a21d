//! キーワードルール表 — 分類モデルが使えないときの決定的フォールバック
//!
//! (パターン集合 → CommandKind) を優先順に並べた表として保持し、
//! 先頭から評価して最初にマッチしたルールを採用する。
//! どのルールにもマッチしなければ発話全体を General として返す。

use regex::Regex;
use tracing::debug;

use super::command::{Command, CommandKind};

/// 1 つのキーワードルール
pub struct KeywordRule {
    kind: CommandKind,
    /// すべてマッチする必要があるパターン
    required: Vec<Regex>,
    /// 引数抽出用パターン（名前付きグループ `arg`）。None なら発話全体を引数にする。
    argument: Option<Regex>,
}

impl KeywordRule {
    fn new(kind: CommandKind, required: &[&str], argument: Option<&str>) -> Self {
        Self {
            kind,
            required: required
                .iter()
                .map(|p| Regex::new(p).expect("invalid keyword rule pattern"))
                .collect(),
            argument: argument.map(|p| Regex::new(p).expect("invalid argument pattern")),
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    fn matches(&self, text: &str) -> bool {
        self.required.iter().all(|re| re.is_match(text))
    }

    fn extract_argument(&self, text: &str) -> String {
        self.argument
            .as_ref()
            .and_then(|re| re.captures(text))
            .and_then(|caps| caps.name("arg"))
            .map(|m| m.as_str().trim().trim_end_matches(['.', '!', '?']).to_string())
            .filter(|arg| !arg.is_empty())
            .unwrap_or_else(|| text.to_string())
    }
}

/// 優先順位付きのルール表
pub struct RuleTable {
    rules: Vec<KeywordRule>,
}

impl RuleTable {
    /// 標準のルール表を構築する。
    ///
    /// 優先順位（先勝ち）:
    /// 1. 時事・ニュース語 → Realtime
    /// 2. open / launch → OpenApp
    /// 3. close / shut → CloseApp
    /// 4. play / music → PlayMedia
    /// 5. generate / create image → GenerateImage
    /// 6. remind → Reminder
    /// 7. search + google → WebSearch
    /// 8. search + youtube → VideoSearch
    pub fn standard() -> Self {
        let rules = vec![
            KeywordRule::new(
                CommandKind::Realtime,
                &[r"(?i)\b(current|latest|today|now|news|weather)\b"],
                None,
            ),
            KeywordRule::new(
                CommandKind::OpenApp,
                &[r"(?i)\b(open|launch|start)\b"],
                Some(r"(?i)\b(?:open|launch|start)\b\s*(?P<arg>.*)"),
            ),
            KeywordRule::new(
                CommandKind::CloseApp,
                &[r"(?i)\b(close|shut)\b"],
                Some(r"(?i)\b(?:close|shut(?:\s+down)?)\b\s*(?P<arg>.*)"),
            ),
            KeywordRule::new(
                CommandKind::PlayMedia,
                &[r"(?i)\b(play|music|song|songs)\b"],
                Some(r"(?i)\bplay\b\s*(?P<arg>.*)"),
            ),
            KeywordRule::new(
                CommandKind::GenerateImage,
                &[r"(?i)\b(generate|create)\s+(an?\s+)?(image|picture)\b"],
                Some(r"(?i)\b(?:generate|create)\s+(?:an?\s+)?(?:image|picture)\b\s*(?:of\s+)?(?P<arg>.*)"),
            ),
            KeywordRule::new(
                CommandKind::Reminder,
                &[r"(?i)\bremind(er)?\b"],
                Some(r"(?i)\bremind(?:er)?\b(?:\s+me)?(?:\s+to)?\s*(?P<arg>.*)"),
            ),
            KeywordRule::new(
                CommandKind::WebSearch,
                &[r"(?i)\bsearch\b", r"(?i)\bgoogle\b"],
                Some(r"(?i)\bsearch\b(?:\s+(?:on\s+)?google)?(?:\s+for)?\s*(?P<arg>.*)"),
            ),
            KeywordRule::new(
                CommandKind::VideoSearch,
                &[r"(?i)\bsearch\b", r"(?i)\byoutube\b"],
                Some(r"(?i)\bsearch\b(?:\s+(?:on\s+)?youtube)?(?:\s+for)?\s*(?P<arg>.*)"),
            ),
        ];
        Self { rules }
    }

    /// ルールの種別を優先順に返す（テスト・診断用）。
    pub fn order(&self) -> Vec<CommandKind> {
        self.rules.iter().map(KeywordRule::kind).collect()
    }

    /// テキストを分類する。必ず 1 つのコマンドを返す。
    pub fn classify(&self, text: &str) -> Command {
        let text = text.trim();
        for rule in &self.rules {
            if rule.matches(text) {
                let argument = rule.extract_argument(text);
                debug!(
                    input = %text,
                    kind = %rule.kind,
                    argument = %argument,
                    "Keyword rule matched"
                );
                return Command::new(rule.kind, argument);
            }
        }
        debug!(input = %text, "No keyword rule matched, defaulting to general");
        Command::general(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Command {
        RuleTable::standard().classify(text)
    }

    #[test]
    fn rule_order_is_fixed() {
        assert_eq!(
            RuleTable::standard().order(),
            vec![
                CommandKind::Realtime,
                CommandKind::OpenApp,
                CommandKind::CloseApp,
                CommandKind::PlayMedia,
                CommandKind::GenerateImage,
                CommandKind::Reminder,
                CommandKind::WebSearch,
                CommandKind::VideoSearch,
            ]
        );
    }

    #[test]
    fn reminder_is_detected() {
        let cmd = classify("remind me 9pm meeting");
        assert_eq!(cmd.kind, CommandKind::Reminder);
        assert_eq!(cmd.argument, "9pm meeting");
    }

    #[test]
    fn realtime_keywords() {
        assert_eq!(classify("what's the latest news").kind, CommandKind::Realtime);
        assert_eq!(classify("weather in Osaka").kind, CommandKind::Realtime);
    }

    #[test]
    fn realtime_requires_whole_words() {
        // "know" に "now" が含まれていても Realtime にはしない
        assert_eq!(classify("do you know python").kind, CommandKind::General);
    }

    #[test]
    fn open_extracts_target() {
        let cmd = classify("please open spotify");
        assert_eq!(cmd, Command::new(CommandKind::OpenApp, "spotify"));
    }

    #[test]
    fn close_extracts_target() {
        let cmd = classify("close notepad");
        assert_eq!(cmd, Command::new(CommandKind::CloseApp, "notepad"));
    }

    #[test]
    fn play_extracts_song() {
        let cmd = classify("play afsanay");
        assert_eq!(cmd, Command::new(CommandKind::PlayMedia, "afsanay"));
    }

    #[test]
    fn music_without_play_keeps_whole_text() {
        let cmd = classify("some relaxing music");
        assert_eq!(cmd.kind, CommandKind::PlayMedia);
        assert_eq!(cmd.argument, "some relaxing music");
    }

    #[test]
    fn image_generation_extracts_prompt() {
        let cmd = classify("generate image of a cat in space");
        assert_eq!(cmd, Command::new(CommandKind::GenerateImage, "a cat in space"));
    }

    #[test]
    fn web_and_video_search() {
        let cmd = classify("search google for rust lifetimes");
        assert_eq!(cmd, Command::new(CommandKind::WebSearch, "rust lifetimes"));

        let cmd = classify("search youtube for lofi beats");
        assert_eq!(cmd, Command::new(CommandKind::VideoSearch, "lofi beats"));
    }

    #[test]
    fn search_alone_is_general() {
        assert_eq!(classify("search for meaning").kind, CommandKind::General);
    }

    #[test]
    fn priority_first_match_wins() {
        // "open" と "play" の両方を含む場合は OpenApp が優先される
        assert_eq!(classify("open youtube and play music").kind, CommandKind::OpenApp);
        // Realtime が最優先
        assert_eq!(classify("open today's news").kind, CommandKind::Realtime);
    }

    #[test]
    fn fallback_is_general_with_original_text() {
        let cmd = classify("tell me a joke");
        assert_eq!(cmd, Command::general("tell me a joke"));
    }
}
