//! Asynchronous line splitting for child process output.
//!
//! ffmpeg rewrites its status line in place with a bare `\r`, so the
//! [`CrLfLineCodec`] treats both CR and LF as terminators. Runs of
//! terminators (CRLF, blank lines) never produce empty lines, bytes are
//! decoded as lossy UTF-8 and trailing data without a terminator is flushed
//! as a final line when the stream ends.

use std::io;

use bytes::BytesMut;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, FramedRead};

/// Decoder that splits a byte stream on `\r` or `\n`.
#[derive(Debug, Clone, Default)]
pub struct CrLfLineCodec {
    /// Bytes of the buffer already scanned without finding a terminator.
    next_index: usize,
}

impl CrLfLineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_terminator(b: &u8) -> bool {
    *b == b'\n' || *b == b'\r'
}

impl Decoder for CrLfLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        loop {
            let Some(offset) = buf[self.next_index..].iter().position(is_terminator) else {
                self.next_index = buf.len();
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;
            let segment = buf.split_to(end + 1);
            let text = &segment[..end];
            if text.is_empty() {
                continue;
            }
            return Ok(Some(String::from_utf8_lossy(text).into_owned()));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        let rest = buf.split_to(buf.len());
        Ok(Some(String::from_utf8_lossy(&rest).into_owned()))
    }
}

/// Pull-style line reader over any async byte stream.
pub struct LineStreamReader<R> {
    framed: FramedRead<R, CrLfLineCodec>,
}

impl<R: AsyncRead + Unpin> LineStreamReader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            framed: FramedRead::new(stream, CrLfLineCodec::new()),
        }
    }

    /// Next complete line, an I/O error, or `None` at end of stream.
    ///
    /// Cancel safe: dropping the future loses no buffered data.
    pub async fn next_line(&mut self) -> Option<io::Result<String>> {
        self.framed.next().await
    }
}

/// Receives lines from [`start_reading`].
pub trait LineObserver: Send {
    /// Called once per non-empty line, in stream order.
    fn on_line(&mut self, line: String);

    /// Called once when the stream closes cleanly.
    fn on_end_of_stream(&mut self) {}

    /// Called at most once; the read loop stops afterwards and
    /// [`on_end_of_stream`](Self::on_end_of_stream) is not called.
    fn on_error(&mut self, error: io::Error) {
        tracing::debug!(error = %error, "Line stream read failed");
    }
}

/// Spawn a read loop that delivers every line of `stream` to `observer`.
///
/// The loop runs as a task on the current runtime, not a thread. The join
/// handle returns the observer once the stream has ended or failed.
pub fn start_reading<R, O>(stream: R, mut observer: O) -> JoinHandle<O>
where
    R: AsyncRead + Unpin + Send + 'static,
    O: LineObserver + 'static,
{
    tokio::spawn(async move {
        let mut reader = LineStreamReader::new(stream);
        loop {
            match reader.next_line().await {
                Some(Ok(line)) => observer.on_line(line),
                Some(Err(e)) => {
                    observer.on_error(e);
                    break;
                }
                None => {
                    observer.on_end_of_stream();
                    break;
                }
            }
        }
        observer
    })
}
