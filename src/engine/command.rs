//! コマンドモデル — 分類済みのユーザー意図を表す型
//!
//! 分類器が一度だけラベル文字列をデコードし、以降のコードは
//! `CommandKind` を網羅的に match する。プレフィックス文字列の再パースは行わない。

use std::fmt;

/// コマンドの種別（閉じた語彙）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// 通常の会話・質問
    General,
    /// 最新情報が必要な質問（Web 検索付き）
    Realtime,
    /// アプリ / Web サイトを開く
    OpenApp,
    /// アプリを閉じる
    CloseApp,
    /// 音楽・動画を再生する
    PlayMedia,
    /// 画像生成
    GenerateImage,
    /// リマインダー登録
    Reminder,
    /// 音量などのシステム操作
    SystemAction,
    /// 文章作成（手紙、メール、コード等）
    ContentWrite,
    /// Google 検索
    WebSearch,
    /// YouTube 検索
    VideoSearch,
    /// 会話の終了
    Exit,
}

impl CommandKind {
    /// すべての種別（ラベル表示順）
    pub const ALL: [CommandKind; 12] = [
        CommandKind::General,
        CommandKind::Realtime,
        CommandKind::OpenApp,
        CommandKind::CloseApp,
        CommandKind::PlayMedia,
        CommandKind::GenerateImage,
        CommandKind::Reminder,
        CommandKind::SystemAction,
        CommandKind::ContentWrite,
        CommandKind::WebSearch,
        CommandKind::VideoSearch,
        CommandKind::Exit,
    ];

    /// 分類ラベルで使うプレフィックス
    pub fn prefix(self) -> &'static str {
        match self {
            CommandKind::General => "general",
            CommandKind::Realtime => "realtime",
            CommandKind::OpenApp => "open",
            CommandKind::CloseApp => "close",
            CommandKind::PlayMedia => "play",
            CommandKind::GenerateImage => "generate image",
            CommandKind::Reminder => "reminder",
            CommandKind::SystemAction => "system",
            CommandKind::ContentWrite => "content",
            CommandKind::WebSearch => "google search",
            CommandKind::VideoSearch => "youtube search",
            CommandKind::Exit => "exit",
        }
    }

    /// 引数が空のときに元の発話で補うべき種別か。
    fn borrows_utterance(self) -> bool {
        matches!(self, CommandKind::General | CommandKind::Realtime)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// 分類済みコマンド。種別と自由記述の引数を 1 つ持つ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub argument: String,
}

impl Command {
    pub fn new(kind: CommandKind, argument: impl Into<String>) -> Self {
        Self {
            kind,
            argument: argument.into(),
        }
    }

    pub fn general(argument: impl Into<String>) -> Self {
        Self::new(CommandKind::General, argument)
    }

    pub fn exit() -> Self {
        Self::new(CommandKind::Exit, String::new())
    }

    pub fn is_exit(&self) -> bool {
        self.kind == CommandKind::Exit
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.argument.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} {}", self.kind, self.argument)
        }
    }
}

/// 空にならないコマンド列。
///
/// 構築は `single` か `from_vec`（空なら None）のみで、
/// 分類結果が空になる状態を型で排除する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandList(Vec<Command>);

impl CommandList {
    pub fn single(command: Command) -> Self {
        Self(vec![command])
    }

    pub fn from_vec(commands: Vec<Command>) -> Option<Self> {
        if commands.is_empty() {
            None
        } else {
            Some(Self(commands))
        }
    }

    pub fn as_slice(&self) -> &[Command] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn first(&self) -> &Command {
        &self.0[0]
    }

    /// Exit を末尾に 1 つだけ置く。
    ///
    /// Exit 以外が残らない場合は `[Exit]` になる。
    pub fn with_terminal_exit(self) -> Self {
        let mut commands: Vec<Command> = self.0.into_iter().filter(|c| !c.is_exit()).collect();
        commands.push(Command::exit());
        Self(commands)
    }

    pub fn into_vec(self) -> Vec<Command> {
        self.0
    }
}

impl IntoIterator for CommandList {
    type Item = Command;
    type IntoIter = std::vec::IntoIter<Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// 長いプレフィックスから順に照合する（"generate image" を "general" より先に等）。
const PARSE_ORDER: [CommandKind; 12] = [
    CommandKind::GenerateImage,
    CommandKind::WebSearch,
    CommandKind::VideoSearch,
    CommandKind::Realtime,
    CommandKind::General,
    CommandKind::Reminder,
    CommandKind::ContentWrite,
    CommandKind::SystemAction,
    CommandKind::OpenApp,
    CommandKind::CloseApp,
    CommandKind::PlayMedia,
    CommandKind::Exit,
];

/// 分類モデルが返した 1 ラベルを `Command` にデコードする。
///
/// - 既知プレフィックスで始まるラベルのみ受理する（語境界が必要: "opened" は不可）
/// - 先頭でなくても `general` / `realtime` を明示しているラベルは、その位置から解釈する
/// - `(query)` のようなプレースホルダーだけのラベルは捨てる
/// - General / Realtime の引数が空なら `utterance` で補う
pub fn parse_label(label: &str, utterance: &str) -> Option<Command> {
    let cleaned = label
        .trim()
        .trim_start_matches(|c: char| c == '-' || c == '*' || c.is_whitespace())
        .trim_end_matches(['.', ' '])
        .trim();
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("(query)") {
        return None;
    }

    // ASCII のみ小文字化し、元文字列とのバイト位置を一致させる
    let lower = cleaned.to_ascii_lowercase();

    for kind in PARSE_ORDER {
        if let Some(rest) = strip_keyword(&lower, cleaned, kind.prefix()) {
            return Some(build(kind, rest, utterance));
        }
    }

    // 先頭以外で general / realtime を名指ししているラベル（"1. general foo" 等）
    for kind in [CommandKind::Realtime, CommandKind::General] {
        if let Some(pos) = find_word(&lower, kind.prefix()) {
            let rest = &cleaned[pos + kind.prefix().len()..];
            return Some(build(kind, rest, utterance));
        }
    }

    None
}

fn build(kind: CommandKind, rest: &str, utterance: &str) -> Command {
    let argument = strip_placeholder(rest.trim());
    if argument.is_empty() && kind.borrows_utterance() {
        return Command::new(kind, utterance.trim());
    }
    Command::new(kind, argument)
}

/// "(query)" 形式の括弧を外す。括弧の中身がプレースホルダーなら空文字列を返す。
fn strip_placeholder(argument: &str) -> String {
    let inner = argument
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(argument)
        .trim();
    if inner.eq_ignore_ascii_case("query") {
        String::new()
    } else {
        inner.to_string()
    }
}

/// `lower` が `keyword` で始まり直後が語境界なら、元の大文字小文字を保った残りを返す。
fn strip_keyword<'a>(lower: &str, original: &'a str, keyword: &str) -> Option<&'a str> {
    if !lower.starts_with(keyword) {
        return None;
    }
    let rest = &original[keyword.len()..];
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() || c == '(' || c == ':' => Some(rest),
        Some(_) => None,
    }
}

/// 語境界で区切られた `word` の出現位置を返す。
fn find_word(haystack: &str, word: &str) -> Option<usize> {
    haystack.match_indices(word).map(|(i, _)| i).find(|&i| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + word.len()..].chars().next();
        !before.is_some_and(|c| c.is_alphanumeric()) && !after.is_some_and(|c| c.is_alphanumeric())
    })
}

/// カンマ区切りの分類応答をデコードし、受理できたコマンドだけを返す。
pub fn parse_labels(reply: &str, utterance: &str) -> Vec<Command> {
    reply
        .replace('\n', " ")
        .split(',')
        .filter_map(|label| parse_label(label, utterance))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_labels() {
        assert_eq!(
            parse_label("open chrome", "x"),
            Some(Command::new(CommandKind::OpenApp, "chrome"))
        );
        assert_eq!(
            parse_label("generate image of a red fox", "x"),
            Some(Command::new(CommandKind::GenerateImage, "of a red fox"))
        );
        assert_eq!(
            parse_label("google search Elon Musk", "x"),
            Some(Command::new(CommandKind::WebSearch, "Elon Musk"))
        );
        assert_eq!(
            parse_label("youtube search python tutorial", "x"),
            Some(Command::new(CommandKind::VideoSearch, "python tutorial"))
        );
        assert_eq!(parse_label("exit", "bye"), Some(Command::exit()));
    }

    #[test]
    fn parse_label_preserves_argument_case() {
        let cmd = parse_label("Play Mast Magan", "x").unwrap();
        assert_eq!(cmd.kind, CommandKind::PlayMedia);
        assert_eq!(cmd.argument, "Mast Magan");
    }

    #[test]
    fn parse_label_requires_word_boundary() {
        assert_eq!(parse_label("opened the door", "x"), None);
        assert_eq!(parse_label("player one", "x"), None);
        assert_eq!(parse_label("closet", "x"), None);
    }

    #[test]
    fn parse_label_rejects_unknown_and_placeholders() {
        assert_eq!(parse_label("weather in tokyo", "x"), None);
        assert_eq!(parse_label("(query)", "x"), None);
        assert_eq!(parse_label("   ", "x"), None);
    }

    #[test]
    fn general_placeholder_borrows_utterance() {
        let cmd = parse_label("general (query)", "how are you?").unwrap();
        assert_eq!(cmd, Command::general("how are you?"));

        let cmd = parse_label("realtime", "latest news").unwrap();
        assert_eq!(cmd, Command::new(CommandKind::Realtime, "latest news"));
    }

    #[test]
    fn general_named_mid_label_is_accepted() {
        let cmd = parse_label("1. general what is rust", "x").unwrap();
        assert_eq!(cmd, Command::general("what is rust"));
    }

    #[test]
    fn parse_labels_splits_on_commas() {
        let commands = parse_labels(
            "open chrome, general tell me about mahatma gandhi.",
            "open chrome and tell me about mahatma gandhi",
        );
        assert_eq!(
            commands,
            vec![
                Command::new(CommandKind::OpenApp, "chrome"),
                Command::general("tell me about mahatma gandhi"),
            ]
        );
    }

    #[test]
    fn parse_labels_drops_garbage_entries() {
        let commands = parse_labels("I think, maybe, close notepad", "x");
        assert_eq!(commands, vec![Command::new(CommandKind::CloseApp, "notepad")]);
    }

    #[test]
    fn command_list_cannot_be_empty() {
        assert!(CommandList::from_vec(vec![]).is_none());
        let list = CommandList::single(Command::general("hi"));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn terminal_exit_is_unique_and_last() {
        let list = CommandList::from_vec(vec![
            Command::exit(),
            Command::general("hi"),
            Command::exit(),
        ])
        .unwrap()
        .with_terminal_exit();
        assert_eq!(list.into_vec(), vec![Command::general("hi"), Command::exit()]);
    }

    #[test]
    fn display_round_trips_through_parse() {
        for kind in CommandKind::ALL {
            if kind == CommandKind::Exit {
                continue;
            }
            let cmd = Command::new(kind, "something");
            assert_eq!(parse_label(&cmd.to_string(), "x"), Some(cmd));
        }
    }
}
