//! Local transport: newline-delimited JSON over a byte pipe.
//!
//! One request per input line, one response per output line. A line is fully
//! answered before the next one is read.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::models::response::{OutboundMessage, ResponseKind};
use crate::services::dispatcher::{Dispatcher, INVALID_JSON};

/// Serve requests until `reader` reaches end of input.
///
/// Returns the number of requests answered. Blank lines are skipped; lines
/// that are not valid UTF-8 are answered as invalid JSON.
pub async fn serve_lines<R, W>(
    dispatcher: &Dispatcher,
    mut reader: R,
    mut writer: W,
) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut answered = 0;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            tracing::info!(answered, "Input closed, stopping");
            break;
        }

        let response = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => dispatcher.handle_line(line.trim()).await,
            Err(e) => {
                tracing::warn!(error = %e, "Rejecting non UTF-8 input line");
                OutboundMessage::error(ResponseKind::Response, INVALID_JSON)
            }
        };
        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        writer.write_all(encoded.as_bytes()).await?;
        writer.flush().await?;
        answered += 1;
    }

    Ok(answered)
}
