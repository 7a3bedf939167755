//! Decoder for the scenario-generation progress stream.
//!
//! The generation endpoint answers with newline-delimited JSON records
//! (`{"message": ..., "progress": ...}`), separated by blank lines. Network
//! chunks may split a record (or a UTF-8 sequence) anywhere, so the decoder
//! buffers raw bytes and only decodes complete lines.

use crate::protocol::ProgressUpdate;

#[derive(Debug, Default)]
pub struct ProgressDecoder {
    buffer: Vec<u8>,
    skipped: usize,
}

impl ProgressDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every record completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ProgressUpdate> {
        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(update) = self.decode_line(&line[..line.len() - 1]) {
                out.push(update);
            }
        }
        out
    }

    /// Flush a trailing record that was not newline-terminated.
    pub fn finish(&mut self) -> Option<ProgressUpdate> {
        let rest = std::mem::take(&mut self.buffer);
        self.decode_line(&rest)
    }

    /// Lines that could not be decoded so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<ProgressUpdate> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        match serde_json::from_str::<ProgressUpdate>(text) {
            Ok(update) => Some(update),
            Err(e) => {
                self.skipped += 1;
                log::warn!("[progress] Failed to parse progress line '{}': {}", text, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_records_separated_by_blank_lines() {
        let mut d = ProgressDecoder::new();
        let out = d.push(
            b"{\"message\":\"Downloading\",\"progress\":10}\n\n{\"message\":\"Building\",\"progress\":40}\n\n",
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].message, "Downloading");
        assert_eq!(out[1].progress, 40.0);
    }

    #[test]
    fn record_split_across_chunks() {
        let mut d = ProgressDecoder::new();
        assert!(d.push(b"{\"message\":\"Gen").is_empty());
        let out = d.push(b"erating\",\"progress\":55.5}\n");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message, "Generating");
        assert_eq!(out[0].progress, 55.5);
    }

    #[test]
    fn multibyte_text_split_mid_character() {
        let record = "{\"message\":\"시나리오\",\"progress\":1}\n".as_bytes();
        let mut d = ProgressDecoder::new();
        let (a, b) = record.split_at(15);
        assert!(d.push(a).is_empty());
        let out = d.push(b);
        assert_eq!(out[0].message, "시나리오");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let mut d = ProgressDecoder::new();
        let out = d.push(b"garbage\n{\"message\":\"ok\",\"progress\":100}\n");
        assert_eq!(out.len(), 1);
        assert_eq!(d.skipped(), 1);
    }

    #[test]
    fn finish_flushes_unterminated_record() {
        let mut d = ProgressDecoder::new();
        assert!(d.push(b"{\"message\":\"done\",\"progress\":100}").is_empty());
        assert_eq!(d.finish().unwrap().message, "done");
        assert!(d.finish().is_none());
    }
}
