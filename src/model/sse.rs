// src/model/sse.rs
// Shared `data: ...` line extraction over a raw byte stream, grounded in
// the teacher's hand-rolled SSE parsing in `Gpt5Provider::stream` (no SSE
// client crate is used upstream either; providers' frames are irregular
// enough — comments, blank keepalives, brand-specific event names — that
// a generic SSE crate buys little over splitting on newlines).

use futures::{Stream, StreamExt};
use reqwest::Response;

/// Turns a chunked HTTP response into a stream of `data: ` payloads with
/// the prefix stripped. Skips comments, blank lines, and any non-`data`
/// field. Does not special-case `[DONE]` — callers check for that.
pub fn data_lines(response: Response) -> impl Stream<Item = String> + Send {
    let byte_stream = response.bytes_stream();
    async_stream::stream! {
        let mut buf = String::new();
        futures::pin_mut!(byte_stream);
        while let Some(chunk) = byte_stream.next().await {
            let Ok(bytes) = chunk else { break };
            let Ok(text) = std::str::from_utf8(&bytes) else { continue };
            buf.push_str(text);

            while let Some(pos) = buf.find('\n') {
                let line = buf[..pos].trim_end_matches('\r').to_string();
                buf.drain(..=pos);
                let line = line.trim();
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                if let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) {
                    yield data.trim().to_string();
                }
            }
        }
    }
}
