use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use super::chat_log::{ChatLog, ConversationWindow};
use crate::ai::ChatTurn;

/// 並行するハンドラ間で共有されるセッション。
/// ロックはスナップショット取得とコミットの間だけ保持し、補完呼び出しをまたがない。
pub type SharedSession = Arc<tokio::sync::Mutex<Session>>;

/// プロセス存続中の会話状態
#[derive(Debug)]
pub struct Session {
    window: ConversationWindow,
    log: ChatLog,
}

impl Session {
    /// ログから履歴を読み込んでセッションを開始する。
    pub fn load(log: ChatLog) -> Self {
        let window = log.load_or_reset();
        Self { window, log }
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    /// 末尾 `keep` ターンの複製を返す。
    pub fn snapshot(&self, keep: usize) -> Vec<ChatTurn> {
        self.window.suffix(keep).to_vec()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// ユーザー発話と応答を追記し、全履歴を保存する。
    pub fn commit_exchange(&mut self, user: &str, assistant: &str) -> Result<()> {
        self.window.push(ChatTurn::user(user));
        self.window.push(ChatTurn::assistant(assistant));
        debug!(turns = self.window.len(), "Session exchange committed");
        self.log.save(&self.window)
    }

    /// 履歴を消去し、空の状態を保存する。
    pub fn reset(&mut self) -> Result<()> {
        warn!(discarded_turns = self.window.len(), "Session reset");
        self.window.clear();
        self.log.save(&self.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn commit_appends_and_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chat_log.json");
        let mut session = Session::load(ChatLog::new(path.clone()));

        session.commit_exchange("hi", "Hello, sir.").unwrap();
        session.commit_exchange("how are you", "Fine.").unwrap();

        let reloaded = Session::load(ChatLog::new(path));
        assert_eq!(reloaded.len(), 4);
        assert_eq!(reloaded.snapshot(1), vec![ChatTurn::assistant("Fine.")]);
    }

    #[test]
    fn reset_wipes_and_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chat_log.json");
        let mut session = Session::load(ChatLog::new(path.clone()));
        session.commit_exchange("hi", "hello").unwrap();

        session.reset().unwrap();
        assert!(session.is_empty());
        assert!(Session::load(ChatLog::new(path)).is_empty());
    }

    #[tokio::test]
    async fn shared_session_is_usable_across_tasks() {
        let tmp = TempDir::new().unwrap();
        let shared = Session::load(ChatLog::new(tmp.path().join("log.json"))).shared();

        let mut handles = Vec::new();
        for i in 0..4 {
            let session = Arc::clone(&shared);
            handles.push(tokio::spawn(async move {
                session
                    .lock()
                    .await
                    .commit_exchange(&format!("q{i}"), &format!("a{i}"))
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(shared.lock().await.len(), 8);
    }
}
