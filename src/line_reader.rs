use crate::error::PorterError;
use futures::{Stream, StreamExt};
use tokio_util::codec::LinesCodecError;
use tracing::warn;

/// Line stream of a serial device that outlives corrupt lines.
///
/// `Framed` ends the stream once after every decode error and resumes on the next poll.
/// That single end is skipped, only an end not preceded by an error means the port closed.
pub struct LineReader<S> {
    inner: S,
    errored: bool,
}

impl<S> LineReader<S>
where
    S: Stream<Item = Result<String, LinesCodecError>> + Unpin,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            errored: false,
        }
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Next line, `Ok(None)` for a line that could not be decoded
    pub async fn next_line(&mut self) -> Result<Option<String>, PorterError> {
        loop {
            match self.inner.next().await {
                Some(Ok(line)) => {
                    self.errored = false;
                    return Ok(Some(line));
                }
                Some(Err(err)) => {
                    warn!("Dropping undecodable line {:?}", err);
                    self.errored = true;
                    return Ok(None);
                }
                None if self.errored => self.errored = false,
                None => return Err(PorterError::PortClosed),
            }
        }
    }
}
