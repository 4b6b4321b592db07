//! Incremental decoder for line-delimited JSON output.
//!
//! Agent tools write one JSON object per line on stdout, but pipe reads hand
//! us arbitrary byte chunks. The decoder keeps a carry-over buffer of raw
//! bytes and only converts a line to text once its terminating `\n` has
//! arrived. Because `\n` can never appear inside a multi-byte UTF-8 sequence,
//! a character split across two chunks is always reassembled before decoding.

use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// One item of a decoded record sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A successfully parsed JSON object (or any JSON value).
    Json(Value),
    /// Something went wrong; surfaced in-band rather than dropped.
    Error(RecordError),
}

impl Record {
    /// Whether this is an error-kind record.
    pub fn is_error(&self) -> bool {
        matches!(self, Record::Error(_))
    }
}

/// Error-kind records produced by the decoder or the process driver.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordError {
    /// A complete line that did not parse as JSON.
    Malformed { line: String, reason: String },
    /// The process exited non-zero without reporting an error itself.
    Exited { code: i32, stderr: String },
    /// The process was killed by a signal nobody in this process sent.
    Signalled { signal: i32, stderr: String },
    /// The idle-output watchdog fired.
    IdleTimeout { after: Duration },
}

impl RecordError {
    /// Exit code to feed into failure classification, if one applies.
    ///
    /// Signals use the shell convention of `128 + signal`.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RecordError::Exited { code, .. } => Some(*code),
            RecordError::Signalled { signal, .. } => Some(128 + signal),
            RecordError::Malformed { .. } | RecordError::IdleTimeout { .. } => None,
        }
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::Malformed { line, reason } => {
                write!(f, "malformed output line ({}): {}", reason, line)
            }
            RecordError::Exited { code, stderr } => {
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    write!(f, "process exited with code {}", code)
                } else {
                    write!(f, "{}", stderr)
                }
            }
            RecordError::Signalled { signal, stderr } => {
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    write!(f, "process was killed by signal {}", signal)
                } else {
                    write!(f, "process was killed by signal {}: {}", signal, stderr)
                }
            }
            RecordError::IdleTimeout { after } => write!(
                f,
                "agent produced no output for {}s and timed out",
                after.as_secs_f64()
            ),
        }
    }
}

/// Longest line kept while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Bytes of an overlong line quoted in its error record.
const EXCERPT_BYTES: usize = 200;

/// Stateful newline splitter and JSON parser.
#[derive(Debug)]
pub struct LineDecoder {
    pending: Vec<u8>,
    max_line: usize,
    /// Dropping the rest of an overlong line.
    discarding: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line,
            discarding: false,
        }
    }

    /// Feed one chunk and return every record completed by it.
    ///
    /// A line that outgrows the limit before its newline arrives becomes one
    /// `Malformed` record; the rest of it, up to the newline, is dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Record> {
        let mut records = Vec::new();
        let mut chunk = chunk;
        if self.discarding {
            match chunk.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    self.discarding = false;
                    chunk = &chunk[i + 1..];
                }
                None => return records,
            }
        }
        self.pending.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            if let Some(record) = decode_line(&self.pending[start..end]) {
                records.push(record);
            }
            start = end + 1;
        }
        self.pending.drain(..start);

        if self.pending.len() > self.max_line {
            records.push(self.overflow());
        }
        records
    }

    /// Decode whatever is left once the stream has closed.
    ///
    /// Tools occasionally omit the final newline; that last line still counts.
    pub fn finish(&mut self) -> Option<Record> {
        let rest = std::mem::take(&mut self.pending);
        if std::mem::take(&mut self.discarding) {
            return None;
        }
        decode_line(&rest)
    }

    /// Bytes buffered while waiting for a newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn overflow(&mut self) -> Record {
        let cut = self.pending.len().min(EXCERPT_BYTES);
        let excerpt = String::from_utf8_lossy(&self.pending[..cut]).into_owned();
        self.pending.clear();
        self.discarding = true;
        Record::Error(RecordError::Malformed {
            line: format!("{}…", excerpt.trim_start()),
            reason: format!("line exceeds {} bytes without a newline", self.max_line),
        })
    }
}

fn decode_line(bytes: &[u8]) -> Option<Record> {
    let text = String::from_utf8_lossy(bytes);
    let line = text.trim();
    if line.is_empty() {
        return None;
    }

    Some(match serde_json::from_str::<Value>(line) {
        Ok(value) => Record::Json(value),
        Err(e) => Record::Error(RecordError::Malformed {
            line: line.to_string(),
            reason: e.to_string(),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = concat!(
        "{\"type\":\"system\",\"session_id\":\"s-1\"}\n",
        "{\"type\":\"assistant\",\"text\":\"héllo wörld 🔧 ünïcödé\"}\n",
        "\n",
        "{\"type\":\"result\",\"text\":\"日本語のテキスト\"}\n",
    );

    fn decode_all(chunks: &[&[u8]]) -> Vec<Record> {
        let mut decoder = LineDecoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.push(chunk));
        }
        out.extend(decoder.finish());
        out
    }

    #[test]
    fn decodes_complete_lines() {
        let records = decode_all(&[SAMPLE.as_bytes()]);
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[0],
            Record::Json(json!({"type": "system", "session_id": "s-1"}))
        );
        assert!(records.iter().all(|r| !r.is_error()));
    }

    #[test]
    fn every_two_way_split_yields_identical_records() {
        let bytes = SAMPLE.as_bytes();
        let expected = decode_all(&[bytes]);

        // Includes splits inside multi-byte characters.
        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(decode_all(&[a, b]), expected, "split at byte {}", split);
        }
    }

    #[test]
    fn byte_at_a_time_yields_identical_records() {
        let bytes = SAMPLE.as_bytes();
        let expected = decode_all(&[bytes]);
        let chunks: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_all(&chunks), expected);
    }

    #[test]
    fn split_inside_emoji_is_reassembled() {
        let line = "{\"t\":\"🔧\"}\n".as_bytes();
        let emoji_start = line.iter().position(|&b| b == 0xF0).unwrap();
        let mut decoder = LineDecoder::new();

        assert!(decoder.push(&line[..emoji_start + 2]).is_empty());
        let records = decoder.push(&line[emoji_start + 2..]);
        assert_eq!(records, vec![Record::Json(json!({"t": "🔧"}))]);
    }

    #[test]
    fn malformed_line_yields_one_error_and_decoding_continues() {
        let input = b"{\"a\":1}\nthis is not json\n{\"b\":2}\n";
        let records = decode_all(&[input]);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0], Record::Json(json!({"a": 1})));
        match &records[1] {
            Record::Error(RecordError::Malformed { line, .. }) => {
                assert_eq!(line, "this is not json")
            }
            other => panic!("expected malformed record, got {:?}", other),
        }
        assert_eq!(records[2], Record::Json(json!({"b": 2})));
        assert_eq!(records.iter().filter(|r| r.is_error()).count(), 1);
    }

    #[test]
    fn malformed_error_message_contains_offending_text() {
        let records = decode_all(&[b"{broken\n"]);
        let Record::Error(err) = &records[0] else {
            panic!("expected error record");
        };
        assert!(err.to_string().contains("{broken"));
    }

    #[test]
    fn partial_line_is_retained_until_newline() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"{\"a\":").is_empty());
        assert_eq!(decoder.pending_len(), 5);
        let records = decoder.push(b"1}\n");
        assert_eq!(records, vec![Record::Json(json!({"a": 1}))]);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn trailing_line_without_newline_is_decoded_on_finish() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"{\"last\":true}").is_empty());
        assert_eq!(decoder.finish(), Some(Record::Json(json!({"last": true}))));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let records = decode_all(&[b"{\"a\":1}\r\n{\"b\":2}\r\n"]);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.is_error()));
    }

    #[test]
    fn overlong_line_is_reported_once_and_skipped() {
        let mut decoder = LineDecoder::with_max_line(16);
        let mut records = decoder.push(b"{\"a\":1}\n{\"text\":\"aaaaaaaaaaaaaaaa");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], Record::Json(json!({"a": 1})));
        let Record::Error(RecordError::Malformed { line, reason }) = &records[1] else {
            panic!("expected malformed record");
        };
        assert!(line.starts_with("{\"text\":"));
        assert!(reason.contains("16 bytes"));
        assert_eq!(decoder.pending_len(), 0);

        // The rest of the runaway line is dropped, nothing else is reported.
        records = decoder.push(b"bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
        assert!(records.is_empty());
        assert_eq!(decoder.pending_len(), 0);

        records = decoder.push(b"bbbb\"}\n{\"b\":2}\n");
        assert_eq!(records, vec![Record::Json(json!({"b": 2}))]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn overlong_line_at_end_of_stream_is_not_decoded_on_finish() {
        let mut decoder = LineDecoder::with_max_line(8);
        assert_eq!(decoder.push(b"0123456789abcdef").len(), 1);
        decoder.push(b"more");
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn record_error_exit_codes() {
        let exited = RecordError::Exited {
            code: 3,
            stderr: String::new(),
        };
        assert_eq!(exited.exit_code(), Some(3));
        assert_eq!(exited.to_string(), "process exited with code 3");

        let signalled = RecordError::Signalled {
            signal: 9,
            stderr: String::new(),
        };
        assert_eq!(signalled.exit_code(), Some(137));

        let idle = RecordError::IdleTimeout {
            after: Duration::from_secs(30),
        };
        assert_eq!(idle.exit_code(), None);
        assert!(idle.to_string().contains("timed out"));
    }
}
