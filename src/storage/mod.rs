pub mod chat_log;
pub mod handoff;
pub mod reminders;
mod session;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub use session::{Session, SharedSession};

/// データディレクトリを上書きする環境変数
pub const DATA_DIR_ENV: &str = "FRIDAY_DATA_DIR";

/// 永続化ファイルの置き場所。
/// チャットログ・ハンドオフファイル・生成物・ログはすべてこの配下に置く。
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// `FRIDAY_DATA_DIR` があればそれを、なければプラットフォーム既定のパスを使う。
    pub fn resolve() -> Result<Self> {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
            return Self::at(PathBuf::from(dir));
        }
        let proj_dirs =
            ProjectDirs::from("", "", "friday").context("failed to determine data directory")?;
        Self::at(proj_dirs.data_dir().to_path_buf())
    }

    /// 指定されたディレクトリを作成して使う（テスト用にも使用）。
    pub fn at(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root).with_context(|| {
            format!("failed to create data directory: {}", root.display())
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chat_log(&self) -> PathBuf {
        self.root.join("chat_log.json")
    }

    pub fn handoff_file(&self) -> PathBuf {
        self.root.join("image_generation.data")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn content_dir(&self) -> PathBuf {
        self.root.join("content")
    }

    pub fn reminders_file(&self) -> PathBuf {
        self.root.join("reminders.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn repl_history(&self) -> PathBuf {
        self.root.join("repl_history.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn at_creates_directory() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("nested").join("friday");
        let dir = DataDir::at(root.clone()).unwrap();
        assert!(root.is_dir());
        assert_eq!(dir.chat_log(), root.join("chat_log.json"));
        assert_eq!(dir.handoff_file(), root.join("image_generation.data"));
    }

    #[test]
    #[serial]
    fn resolve_honours_env_override() {
        let tmp = TempDir::new().unwrap();
        let original = std::env::var_os(DATA_DIR_ENV);
        std::env::set_var(DATA_DIR_ENV, tmp.path());

        let dir = DataDir::resolve().unwrap();
        assert_eq!(dir.root(), tmp.path());

        match original {
            Some(value) => std::env::set_var(DATA_DIR_ENV, value),
            None => std::env::remove_var(DATA_DIR_ENV),
        }
    }
}
