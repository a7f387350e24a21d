//! Engine モジュール — 発話の分類とコマンドの並行実行
//!
//! 発話 → `IntentClassifier` → `CommandList` → `Dispatcher` → `TaskResult` の流れで処理する。

pub mod classifier;
pub mod command;
pub mod dispatch;
pub mod handlers;
pub mod rules;
