//! Splits arbitrarily chunked output into complete lines.

use super::runtime::{LineSink, OutputStream};

/// Accumulates one output stream: keeps the full text and forwards each
/// completed line to a sink.
#[derive(Debug)]
pub struct LineCapture {
    stream: OutputStream,
    captured: String,
    pending: Vec<u8>,
}

impl LineCapture {
    pub fn new(stream: OutputStream) -> Self {
        Self {
            stream,
            captured: String::new(),
            pending: Vec::new(),
        }
    }

    /// Feeds a chunk; every newline-terminated line in it is sent to `sink`.
    pub fn push(&mut self, chunk: &[u8], sink: &dyn LineSink) {
        self.pending.extend_from_slice(chunk);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.emit(&line, sink);
        }
    }

    /// Flushes an unterminated trailing line and returns the captured text.
    pub fn finish(mut self, sink: &dyn LineSink) -> String {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest, sink);
        }
        self.captured
    }

    fn emit(&mut self, raw: &[u8], sink: &dyn LineSink) {
        let text = String::from_utf8_lossy(raw);
        self.captured.push_str(&text);
        sink.line(self.stream, text.trim_end_matches(|c| c == '\n' || c == '\r'));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl LineSink for Collect {
        fn line(&self, _stream: OutputStream, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    #[test]
    fn test_lines_split_across_chunks() {
        let sink = Collect::default();
        let mut capture = LineCapture::new(OutputStream::Stdout);

        capture.push(b"Test #1: al", &sink);
        capture.push(b"pha ... Passed\r\nTest #2", &sink);
        capture.push(b": beta\n", &sink);
        let text = capture.finish(&sink);

        assert_eq!(
            *sink.0.lock().unwrap(),
            vec!["Test #1: alpha ... Passed", "Test #2: beta"]
        );
        assert_eq!(text, "Test #1: alpha ... Passed\r\nTest #2: beta\n");
    }

    #[test]
    fn test_trailing_line_without_newline_is_flushed() {
        let sink = Collect::default();
        let mut capture = LineCapture::new(OutputStream::Stderr);

        capture.push(b"first\nlast", &sink);
        let text = capture.finish(&sink);

        assert_eq!(*sink.0.lock().unwrap(), vec!["first", "last"]);
        assert_eq!(text, "first\nlast");
    }
}
