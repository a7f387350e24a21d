//! reedline エディタの構築
//!
//! ファイル履歴、オートサジェスト、Emacs キーバインディングを設定する。

use std::path::PathBuf;

use anyhow::{Context, Result};
use nu_ansi_term::{Color, Style};
use reedline::{
    default_emacs_keybindings, DefaultHinter, Emacs, FileBackedHistory, Highlighter, Reedline,
    StyledText,
};

/// 保持する入力履歴の件数
const HISTORY_CAPACITY: usize = 1000;

/// ユーザー入力を明るい白で表示するハイライター
struct WhiteHighlighter;

impl Highlighter for WhiteHighlighter {
    fn highlight(&self, line: &str, _cursor: usize) -> StyledText {
        let mut styled = StyledText::new();
        // Color::White は ANSI 7 (灰色) になるため、RGB で明るい白を指定
        styled.push((Style::new().fg(Color::Rgb(255, 255, 255)), line.to_string()));
        styled
    }
}

/// `history_path` に入力履歴を保存する reedline エディタを構築する。
pub fn build_editor(history_path: PathBuf) -> Result<Reedline> {
    let history = FileBackedHistory::with_file(HISTORY_CAPACITY, history_path.clone())
        .with_context(|| format!("failed to open history file: {}", history_path.display()))?;

    // 履歴からグレーテキストで候補を表示
    let hinter = DefaultHinter::default()
        .with_style(Style::new().fg(Color::DarkGray))
        .with_min_chars(2);

    Ok(Reedline::create()
        .with_history(Box::new(history))
        .with_hinter(Box::new(hinter))
        .with_highlighter(Box::new(WhiteHighlighter))
        .with_edit_mode(Box::new(Emacs::new(default_emacs_keybindings()))))
}
