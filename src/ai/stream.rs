//! AI ストリーミングレスポンス処理
//!
//! 補完 API から届くテキスト片を連結して全文を組み立てる。
//! 終端マーカーの除去と、表示用の空行除去もここで行う。

use anyhow::Result;
use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

/// 一部のモデルが出力する文末マーカー
pub const EOS_MARKER: &str = "</s>";

/// テキスト片のストリームを最後まで読み、連結した全文を返す。
///
/// 途中でエラーが来た場合はそこで中断し、エラーを返す（部分応答は捨てる）。
pub async fn collect_text<S, E>(mut stream: S) -> Result<String>
where
    S: Stream<Item = std::result::Result<String, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut full_text = String::new();
    let mut chunk_count: u32 = 0;

    while let Some(item) = stream.next().await {
        chunk_count += 1;
        match item {
            Ok(piece) => full_text.push_str(&piece),
            Err(e) => {
                warn!(
                    error = %e,
                    chunks_received = chunk_count,
                    text_so_far_len = full_text.len(),
                    "Stream error occurred"
                );
                anyhow::bail!("Stream error: {e}");
            }
        }
    }

    debug!(
        total_chunks = chunk_count,
        full_text_length = full_text.len(),
        "Stream processing completed"
    );

    Ok(strip_eos_marker(&full_text))
}

/// 終端マーカーを除去する。
pub fn strip_eos_marker(text: &str) -> String {
    text.replace(EOS_MARKER, "")
}

/// 表示用に終端マーカー・前後の空白・空行を取り除く。
pub fn tidy_answer(text: &str) -> String {
    strip_eos_marker(text)
        .trim()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
