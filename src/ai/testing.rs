//! テスト用の補完バックエンド

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use futures_util::future::BoxFuture;

use super::types::{CompletionBackend, CompletionRequest};

/// 事前に積んだ応答を順番に返すバックエンド。応答が尽きたらエラーを返す。
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = std::result::Result<&'static str, &'static str>>,
    {
        let replies = replies
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CompletionBackend for ScriptedBackend {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String>> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted reply left".to_string()));
        Box::pin(async move { reply.map_err(|e| anyhow::anyhow!(e)) })
    }
}
