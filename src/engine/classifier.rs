//! 意図分類器 — 発話を型付きコマンド列に変換する
//!
//! 1. 別れの挨拶だけの発話は AI を呼ばずに Exit とする
//! 2. 分類モデルに固定の指示と例示を渡し、カンマ区切りのラベルを得る
//! 3. 既知のプレフィックスを持つラベルだけを採用する
//! 4. 1 つも残らなければキーワードルール表で決定的に分類する
//! 5. 発話末尾の別れの挨拶は Exit を最後に 1 つだけ付与する
//!
//! 外部呼び出しのエラーはログに残して「候補なし」として扱う。
//! 分類器がエラーを返すことはない。

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::command::{parse_labels, Command, CommandList};
use super::rules::RuleTable;
use crate::ai::prompts::{
    CLASSIFIER_EXAMPLES, CLASSIFIER_MAX_TOKENS, CLASSIFIER_PROMPT, CLASSIFIER_TEMPERATURE,
};
use crate::ai::{ChatTurn, CompletionBackend, CompletionRequest};

/// 空入力時に代わりに送る挨拶
const EMPTY_INPUT_GREETING: &str = "hello";

/// 別れの挨拶パターン（小文字で比較）
const FAREWELL_PHRASES: &[&str] = &[
    "bye",
    "bye bye",
    "bye-bye",
    "byebye",
    "goodbye",
    "good bye",
    "good-bye",
    "see you",
    "see ya",
    "good night",
    "goodnight",
    "farewell",
    "ciao",
    "exit",
    "quit",
];

/// 呼びかけプレフィックス
const WAKE_PREFIXES: &[&str] = &["hey friday", "friday", "ok friday"];

/// LLM を主経路、キーワードルール表を副経路とする分類器
pub struct IntentClassifier {
    backend: Option<Arc<dyn CompletionBackend>>,
    rules: RuleTable,
    model: String,
}

impl IntentClassifier {
    pub fn new(backend: Option<Arc<dyn CompletionBackend>>, model: impl Into<String>) -> Self {
        let model = model.into();
        info!(
            backend_available = backend.is_some(),
            model = %model,
            "IntentClassifier initialized"
        );
        Self {
            backend,
            rules: RuleTable::standard(),
            model,
        }
    }

    /// ルール表のみで分類する分類器（API キー未設定時）
    pub fn rules_only() -> Self {
        Self::new(None, "")
    }

    /// 発話を分類する。戻り値は常に 1 件以上のコマンド列。
    pub async fn classify(&self, text: &str) -> CommandList {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            debug!("Empty utterance, substituting greeting");
            return CommandList::single(Command::general(EMPTY_INPUT_GREETING));
        }

        if is_farewell_only(trimmed) {
            debug!(input = %trimmed, reason = "farewell", "Classified as Exit");
            return CommandList::single(Command::exit());
        }

        let candidates = match self.ask_backend(trimmed).await {
            Some(reply) => parse_labels(&reply, trimmed),
            None => Vec::new(),
        };

        let list = match CommandList::from_vec(candidates) {
            Some(list) => {
                debug!(input = %trimmed, commands = list.len(), "Classified by model");
                list
            }
            None => {
                debug!(input = %trimmed, "No model label survived, using keyword rules");
                CommandList::single(self.rules.classify(trimmed))
            }
        };

        if ends_with_farewell(trimmed) {
            debug!(input = %trimmed, "Trailing farewell, appending Exit");
            return list.with_terminal_exit();
        }
        list
    }

    /// 分類モデルに問い合わせる。失敗時は None。
    async fn ask_backend(&self, text: &str) -> Option<String> {
        let backend = self.backend.as_ref()?;

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: classifier_messages(text),
            temperature: CLASSIFIER_TEMPERATURE,
            max_tokens: CLASSIFIER_MAX_TOKENS,
        };

        match backend.complete(request).await {
            Ok(reply) => {
                debug!(input = %text, reply = %reply, "Classifier reply received");
                Some(reply)
            }
            Err(e) => {
                warn!(
                    input = %text,
                    error = %e,
                    "Classification call failed, treating as no candidates"
                );
                None
            }
        }
    }
}

/// 指示 + 例示ペア + 実際の発話からなるメッセージ列を組み立てる。
fn classifier_messages(text: &str) -> Vec<ChatTurn> {
    let mut messages = Vec::with_capacity(CLASSIFIER_EXAMPLES.len() * 2 + 2);
    messages.push(ChatTurn::system(CLASSIFIER_PROMPT));
    for (input, label) in CLASSIFIER_EXAMPLES {
        messages.push(ChatTurn::user(*input));
        messages.push(ChatTurn::assistant(*label));
    }
    messages.push(ChatTurn::user(text));
    messages
}

/// 比較用に小文字化し、呼びかけと末尾の句読点を取り除く。
fn normalize(input: &str) -> String {
    let lower = input.to_lowercase();
    let mut body = lower.trim();
    for prefix in WAKE_PREFIXES {
        if let Some(rest) = body.strip_prefix(prefix) {
            if rest.is_empty() || rest.starts_with([',', ' ']) {
                body = rest.trim_start_matches([',', ' ']);
                break;
            }
        }
    }
    body.trim_end_matches(['.', '!', '?', ',', ' ']).to_string()
}

/// 発話全体が別れの挨拶かどうか。
fn is_farewell_only(input: &str) -> bool {
    let body = normalize(input);
    FAREWELL_PHRASES.iter().any(|phrase| {
        body == *phrase || body.strip_suffix(" friday").is_some_and(|rest| rest == *phrase)
    })
}

/// 発話が別れの挨拶で終わっているかどうか（単語境界で判定）。
fn ends_with_farewell(input: &str) -> bool {
    let body = normalize(input);
    let body = body.strip_suffix(" friday").unwrap_or(&body);
    FAREWELL_PHRASES.iter().any(|phrase| {
        body.strip_suffix(phrase).is_some_and(|head| {
            head.is_empty() || head.ends_with([' ', ',', '.', '!', '?', ';'])
        })
    })
}
