use crate::{error::PorterError, field::CargoBox, line_reader::LineReader};
use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::{Decoder, Framed, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

/// Raw detection as reported by the camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub label: String,
    pub x: i32,
    pub y: i32,
}

impl Detection {
    pub fn new(label: &str, x: i32, y: i32) -> Self {
        Self {
            label: label.to_owned(),
            x,
            y,
        }
    }
}

#[async_trait]
pub trait Vision: Send {
    async fn capture_and_identify(&mut self, max_items: usize) -> Result<Vec<Detection>>;
}

/// Capture detections and keep the ones whose label reads as a box number
pub async fn capture_boxes(vision: &mut dyn Vision, max_items: usize) -> Result<Vec<CargoBox>> {
    let detections = vision.capture_and_identify(max_items).await?;
    Ok(identify_boxes(detections))
}

pub fn identify_boxes(detections: Vec<Detection>) -> Vec<CargoBox> {
    detections
        .into_iter()
        .filter_map(|detection| match parse_box_id(&detection.label) {
            Some(id) => {
                let cargo = CargoBox::new(id, (detection.x, detection.y));
                info!("Identified {}", cargo);
                Some(cargo)
            }
            None => {
                warn!(
                    "Dropping unreadable label {:?} at [{}, {}]",
                    detection.label, detection.x, detection.y
                );
                None
            }
        })
        .collect()
}

fn parse_box_id(label: &str) -> Option<u8> {
    let label = label.trim();
    if label.is_empty() || !label.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    label.parse().ok()
}

#[derive(Deserialize, Debug, Clone)]
pub struct VisionConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// how long to listen for detections
    #[serde(default = "default_capture_window_ms")]
    pub capture_window_ms: u64,
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_max_items() -> usize {
    6
}

fn default_capture_window_ms() -> u64 {
    3000
}

const MAX_LINE_LENGTH: usize = 128;

/// K210 detector streaming `label,x,y,width,height` lines
pub struct K210Vision {
    lines: LineReader<Framed<tokio_serial::SerialStream, LinesCodec>>,
    capture_window: Duration,
}

impl K210Vision {
    pub fn new(config: &VisionConfig) -> Result<Self> {
        let serial_port = tokio_serial::new(&config.port, config.baud_rate)
            .open_native_async()
            .map_err(|_| PorterError::FailedOpeningSerialPort(config.port.clone()))?;
        Ok(Self {
            lines: LineReader::new(
                LinesCodec::new_with_max_length(MAX_LINE_LENGTH).framed(serial_port),
            ),
            capture_window: Duration::from_millis(config.capture_window_ms),
        })
    }
}

#[async_trait]
impl Vision for K210Vision {
    async fn capture_and_identify(&mut self, max_items: usize) -> Result<Vec<Detection>> {
        let deadline = Instant::now() + self.capture_window;
        read_detections(&mut self.lines, deadline, max_items).await
    }
}

/// Collect distinct detections until `max_items` are seen or the deadline passes
async fn read_detections<S>(
    lines: &mut LineReader<S>,
    deadline: Instant,
    max_items: usize,
) -> Result<Vec<Detection>>
where
    S: Stream<Item = Result<String, LinesCodecError>> + Unpin,
{
    let mut detections: Vec<Detection> = Vec::new();
    while detections.len() < max_items {
        let line = match timeout_at(deadline, lines.next_line()).await {
            Err(_) => break,
            Ok(line) => match line? {
                Some(line) => line,
                None => continue,
            },
        };
        match parse_detection_line(&line) {
            // detector repeats the same target every frame
            Some(detection) if detections.iter().any(|d| d.label == detection.label) => {}
            Some(detection) => {
                debug!(?detection, "New detection");
                detections.push(detection);
            }
            None => warn!("Malformed detector line {:?}", line),
        }
    }
    Ok(detections)
}

/// Parse `label,x,y,width,height`
pub fn parse_detection_line(line: &str) -> Option<Detection> {
    let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
    if fields.len() != 5 {
        return None;
    }
    let x = fields[1].parse().ok()?;
    let y = fields[2].parse().ok()?;
    let _width: i32 = fields[3].parse().ok()?;
    let _height: i32 = fields[4].parse().ok()?;
    Some(Detection::new(fields[0], x, y))
}
