//! Incremental server-sent-events decoder
//!
//! The push endpoint delivers frames as `text/event-stream`: `data:` field
//! lines terminated by a blank line. Network chunks can split an event
//! anywhere, so the decoder buffers partial lines across calls. Both LF and
//! CRLF line endings are accepted; comment lines and non-`data` fields
//! (`event:`, `id:`, `retry:`) are ignored.

/// Streaming decoder for `text/event-stream` bodies.
pub struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    /// Create a decoder with empty state.
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            data_lines: Vec::new(),
        }
    }

    /// Feed one chunk of bytes, returning every event payload it completed.
    ///
    /// Multi-line `data:` fields are joined with `\n`, per the event-stream
    /// format.
    pub fn feed(&mut self, input: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(input);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data_lines.is_empty() {
                    events.push(self.data_lines.join("\n"));
                    self.data_lines.clear();
                }
            } else if line.starts_with(':') {
                // Comment line, used by servers as keepalive.
            } else if let Some(value) = line.strip_prefix("data:") {
                let value = value.strip_prefix(' ').unwrap_or(value);
                self.data_lines.push(value.to_string());
            } else if line == "data" {
                self.data_lines.push(String::new());
            }
            // Other fields carry no frame payload.
        }
        events
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}
