use crate::{error::PorterError, line_reader::LineReader};
use anyhow::Result;
use async_trait::async_trait;
use futures::{SinkExt, Stream};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::timeout;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::{Decoder, Framed, LinesCodec, LinesCodecError};
use tracing::trace;

/// Single axis distance sensor facing the direction of travel
#[async_trait]
pub trait RangeSensor: Send {
    /// `Ok(None)` when the sensor produced no usable reading
    async fn read(&mut self) -> Result<Option<u32>>;
}

#[derive(Deserialize, Debug, Clone)]
pub struct RangeSensorConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_read_timeout_ms() -> u64 {
    1000
}

const MEASURE_COMMAND: &str = "measure";
const MAX_LINE_LENGTH: usize = 64;

/// Laser rangefinder answering `measure` requests with a line like `Distance: 412`
pub struct LaserRangeSensor {
    lines: LineReader<Framed<tokio_serial::SerialStream, LinesCodec>>,
    read_timeout: Duration,
}

impl LaserRangeSensor {
    pub fn new(config: &RangeSensorConfig) -> Result<Self> {
        let serial_port = tokio_serial::new(&config.port, config.baud_rate)
            .open_native_async()
            .map_err(|_| PorterError::FailedOpeningSerialPort(config.port.clone()))?;
        Ok(Self {
            lines: LineReader::new(
                LinesCodec::new_with_max_length(MAX_LINE_LENGTH).framed(serial_port),
            ),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
        })
    }
}

#[async_trait]
impl RangeSensor for LaserRangeSensor {
    async fn read(&mut self) -> Result<Option<u32>> {
        self.lines
            .get_mut()
            .send(MEASURE_COMMAND)
            .await
            .map_err(|_| PorterError::CommError)?;
        read_reply(&mut self.lines, self.read_timeout).await
    }
}

async fn read_reply<S>(lines: &mut LineReader<S>, read_timeout: Duration) -> Result<Option<u32>>
where
    S: Stream<Item = Result<String, LinesCodecError>> + Unpin,
{
    let line = match timeout(read_timeout, lines.next_line()).await {
        Ok(line) => line?,
        Err(_) => return Ok(None),
    };
    trace!(?line, "Range sensor response");
    Ok(line.and_then(|line| parse_distance(&line).ok()))
}

/// Distance is the integer after the last `:`, or the whole line when there is none
pub fn parse_distance(line: &str) -> Result<u32, PorterError> {
    let value = line.rsplit(':').next().unwrap_or(line).trim();
    value
        .parse()
        .map_err(|_| PorterError::RangeParse(line.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::codec::FramedRead;

    #[test]
    fn parse_labelled_reading() {
        assert_eq!(parse_distance("Distance: 400").unwrap(), 400);
    }

    #[test]
    fn parse_bare_reading() {
        assert_eq!(parse_distance(" 1234 ").unwrap(), 1234);
    }

    #[test]
    fn parse_uses_last_field() {
        assert_eq!(parse_distance("d:mm:87").unwrap(), 87);
    }

    #[test]
    fn parse_garbage_fails() {
        assert!(parse_distance("Distance: --").is_err());
        assert!(parse_distance("").is_err());
        assert!(parse_distance("Distance: -1").is_err());
    }

    #[tokio::test]
    async fn corrupt_reply_is_no_reading() {
        let data: &[u8] = b"Distance: \xff\nDistance: 400\n";
        let mut lines = LineReader::new(FramedRead::new(data, LinesCodec::new()));
        let read_timeout = Duration::from_secs(1);
        assert_eq!(read_reply(&mut lines, read_timeout).await.unwrap(), None);
        assert_eq!(read_reply(&mut lines, read_timeout).await.unwrap(), Some(400));
        assert!(read_reply(&mut lines, read_timeout).await.is_err());
    }
}
