//! Live, attributed mirroring of container output.
//!
//! Many containers write at once, so every mirrored line is prefixed with the
//! name of the test that produced it.

use crate::execution::{LineSink, OutputStream};

/// Destination for attributed output lines.
pub trait Transcript: Send + Sync {
    fn line(&self, tag: &str, stream: OutputStream, line: &str);
}

/// Writes stdout lines to the process stdout and stderr lines to stderr,
/// one locked write per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct Console;

impl Transcript for Console {
    fn line(&self, tag: &str, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => println!("[{tag}] {line}"),
            OutputStream::Stderr => eprintln!("[{tag}] {line}"),
        }
    }
}

/// Adapts a [`Transcript`] into a [`LineSink`] for one tag.
pub struct Tagged<'a> {
    tag: &'a str,
    transcript: &'a dyn Transcript,
}

impl<'a> Tagged<'a> {
    pub fn new(tag: &'a str, transcript: &'a dyn Transcript) -> Self {
        Self { tag, transcript }
    }
}

impl LineSink for Tagged<'_> {
    fn line(&self, stream: OutputStream, line: &str) {
        self.transcript.line(self.tag, stream, line);
    }
}
