//! Drains one process output stream into the signal queue, line by line.

use futures::StreamExt;
use log::{debug, warn};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use super::engine::Emitter;
use crate::error::LoopError;
use crate::process::OutputStream;

/// Read `stream` to EOF, emitting each line as an `output` signal.
///
/// Oversized and non-UTF-8 lines are reported as `error` signals and skipped.
/// When the queue closes or the stream fails, the remainder is still read
/// and discarded so the process never blocks on a full pipe.
pub(super) async fn drain_lines(stream: OutputStream, emitter: Emitter, iteration: u32, max_line_bytes: usize, label: &'static str) {
    let mut lines = FramedRead::new(stream, LinesCodec::new_with_max_length(max_line_bytes));
    let mut recovering = false;
    let mut count = 0usize;

    loop {
        match lines.next().await {
            Some(Ok(line)) => {
                recovering = false;
                count += 1;
                if !emitter.output(line, iteration).await {
                    debug!("drain_lines({}): queue closed, discarding rest", label);
                    break;
                }
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                warn!("drain_lines({}): line exceeds {} bytes", label, max_line_bytes);
                recovering = true;
                let message = stream_error(label, format!("line exceeds {} bytes", max_line_bytes));
                if !emitter.error(message, iteration).await {
                    break;
                }
            }
            Some(Err(LinesCodecError::Io(e))) if e.kind() == std::io::ErrorKind::InvalidData => {
                warn!("drain_lines({}): invalid line: {}", label, e);
                recovering = true;
                if !emitter.error(stream_error(label, e), iteration).await {
                    break;
                }
            }
            Some(Err(LinesCodecError::Io(e))) => {
                warn!("drain_lines({}): read failed: {}", label, e);
                let _ = emitter.error(stream_error(label, e), iteration).await;
                break;
            }
            // FramedRead yields one None after a decode error, then resumes
            None if recovering => recovering = false,
            None => {
                debug!("drain_lines({}): EOF after {} lines", label, count);
                return;
            }
        }
    }

    let mut rest = lines.into_inner();
    if let Err(e) = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await {
        debug!("drain_lines({}): discard failed: {}", label, e);
    }
}

fn stream_error(label: &str, detail: impl std::fmt::Display) -> String {
    LoopError::Stream(format!("{}: {}", label, detail)).to_string()
}
