use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::ProtocolError;

/// Read one newline-delimited JSON payload from an async buffered reader.
///
/// Returns `Ok(None)` when the stream is closed (EOF). Blank lines are
/// keepalives and also yield `Ok(None)` content-wise; callers distinguish
/// EOF by checking the reader themselves, so blank lines instead map to
/// `Malformed` here — see [`read_payload_skipping`] for the lenient loop.
///
/// Malformed JSON is a recoverable [`ProtocolError::Malformed`]; IO errors
/// are not.
pub async fn read_payload<R, T>(reader: &mut R) -> Result<Option<T>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Ok(None); // EOF
    }

    let trimmed = line.trim();
    if trimmed.is_empty() {
        // Keepalive newline between payloads.
        return Err(ProtocolError::Malformed("empty line".to_string()));
    }

    let payload: T = serde_json::from_str(trimmed)
        .map_err(|e| ProtocolError::Malformed(format!("{}: {}", e, trimmed)))?;
    Ok(Some(payload))
}

/// Read the next decodable payload, skipping malformed lines and keepalives.
///
/// A malformed line must never tear down the stream for every attached
/// client, so this reports skipped lines through `on_skip` and keeps
/// reading. Returns `Ok(None)` on EOF, `Err` only for IO errors.
pub async fn read_payload_skipping<R, T, F>(
    reader: &mut R,
    mut on_skip: F,
) -> Result<Option<T>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
    F: FnMut(&ProtocolError),
{
    loop {
        match read_payload(reader).await {
            Ok(next) => return Ok(next),
            Err(e) if e.is_recoverable() => on_skip(&e),
            Err(e) => return Err(e),
        }
    }
}

/// Write one payload as compact JSON followed by a newline, then flush.
pub async fn write_payload<W, T>(writer: &mut W, payload: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_string(payload)
        .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
