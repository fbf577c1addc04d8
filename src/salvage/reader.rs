//! Bridge from an async byte stream to a blocking [`Read`].

use std::io::{self, Read};

use tokio::sync::mpsc;

/// Blocking reader over a bounded channel of chunks.
///
/// Must only be used off the async runtime (e.g. inside `spawn_blocking`):
/// every read that needs a new chunk blocks on the channel. Because the
/// channel is bounded, the producer cannot run ahead of the consumer by more
/// than the channel capacity.
pub struct ChannelReader {
    rx: mpsc::Receiver<io::Result<Vec<u8>>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl ChannelReader {
    pub fn new(rx: mpsc::Receiver<io::Result<Vec<u8>>>) -> Self {
        Self {
            rx,
            chunk: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.chunk.len() {
            match self.rx.blocking_recv() {
                Some(Ok(chunk)) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                Some(Err(e)) => return Err(e),
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_across_chunks_then_eof() {
        let (tx, rx) = mpsc::channel(4);
        tx.blocking_send(Ok(b"hello ".to_vec())).unwrap();
        tx.blocking_send(Ok(Vec::new())).unwrap();
        tx.blocking_send(Ok(b"world".to_vec())).unwrap();
        drop(tx);

        let mut text = String::new();
        ChannelReader::new(rx).read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn test_error_is_propagated() {
        let (tx, rx) = mpsc::channel(4);
        tx.blocking_send(Ok(b"partial".to_vec())).unwrap();
        tx.blocking_send(Err(io::Error::new(io::ErrorKind::BrokenPipe, "export died")))
            .unwrap();
        drop(tx);

        let mut buf = Vec::new();
        let err = ChannelReader::new(rx).read_to_end(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(buf, b"partial");
    }
}
