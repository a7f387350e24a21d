//! 端末への表示（色・バナー・プロンプト・発話）

pub mod banner;
pub mod color;
pub mod friday;
pub mod prompt;
