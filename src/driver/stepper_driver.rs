use super::{ActuatorConfig, ActuatorDriver, Axis, Direction, StepCommand};
use crate::error::PorterError;
use anyhow::Error;
use anyhow::Result;
use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, warn};

/// Acknowledgement sent by the motor board once a motion finished
#[derive(Debug, PartialEq, Eq)]
pub struct StepAck {
    pub axis_id: u8,
}

pub struct StepperProtocol;

impl Decoder for StepperProtocol {
    type Item = StepAck;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(end) = src.iter().position(|byte| *byte == 0) else {
                return Ok(None);
            };
            let frame = src.split_to(end);
            src.advance(1);
            if frame.is_empty() {
                // stray terminator
                continue;
            }
            let decoded =
                postcard_cobs::decode_vec(&frame).map_err(|_| PorterError::MalformedFrame)?;
            let axis_id = *decoded.first().ok_or(PorterError::MalformedFrame)?;
            return Ok(Some(StepAck { axis_id }));
        }
    }
}

impl Encoder<StepCommand> for StepperProtocol {
    type Error = Error;

    fn encode(&mut self, data: StepCommand, buf: &mut BytesMut) -> Result<(), Error> {
        let encoded_data = data.encode();
        buf.reserve(encoded_data.len());
        buf.put_slice(&encoded_data);
        Ok(())
    }
}

/// Stepper board on a serial line, one command in flight at a time
pub struct StepperDriver {
    framed_port: Framed<tokio_serial::SerialStream, StepperProtocol>,
    config: ActuatorConfig,
}

impl StepperDriver {
    pub fn new(config: ActuatorConfig) -> Result<Self> {
        let serial_port = tokio_serial::new(&config.port, config.baud_rate)
            .open_native_async()
            .map_err(|_| PorterError::FailedOpeningSerialPort(config.port.clone()))?;
        Ok(Self {
            framed_port: StepperProtocol.framed(serial_port),
            config,
        })
    }
}

#[async_trait]
impl ActuatorDriver for StepperDriver {
    async fn drive(&mut self, axis: Axis, direction: Direction, steps: u32) -> Result<()> {
        let command = StepCommand::new(axis, direction, steps);
        debug!("Sending {}", command);
        self.framed_port
            .send(command)
            .await
            .map_err(|_| PorterError::CommError)?;

        let wait = self.config.ack_timeout(steps);
        loop {
            let ack = timeout(wait, self.framed_port.next())
                .await
                .map_err(|_| PorterError::MissingAcknowledgement(axis.name()))?
                .ok_or(PorterError::PortClosed)??;
            if ack.axis_id == axis.wire_id() {
                return Ok(());
            }
            warn!(
                "Ignoring acknowledgement for axis {} while waiting on {}",
                ack.axis_id,
                axis.name()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_ack_frame() {
        let mut frame = postcard_cobs::encode_vec(&[1]);
        frame.push(0);
        let mut buffer = BytesMut::from(&frame[..]);
        let ack = StepperProtocol.decode(&mut buffer).unwrap();
        assert_eq!(ack, Some(StepAck { axis_id: 1 }));
        assert!(buffer.is_empty());
    }

    #[test]
    fn decode_waits_for_terminator() {
        let frame = postcard_cobs::encode_vec(&[3]);
        let mut buffer = BytesMut::from(&frame[..]);
        assert_eq!(StepperProtocol.decode(&mut buffer).unwrap(), None);
        assert_eq!(buffer.len(), frame.len());
    }

    #[test]
    fn decode_skips_stray_terminators() {
        let mut frame = vec![0, 0];
        frame.extend(postcard_cobs::encode_vec(&[2]));
        frame.push(0);
        let mut buffer = BytesMut::from(&frame[..]);
        let ack = StepperProtocol.decode(&mut buffer).unwrap();
        assert_eq!(ack, Some(StepAck { axis_id: 2 }));
    }

    #[test]
    fn encoder_writes_frame() {
        let mut buffer = BytesMut::new();
        StepperProtocol
            .encode(
                StepCommand::new(Axis::Grab, Direction::Positive, 100),
                &mut buffer,
            )
            .unwrap();
        assert_eq!(buffer.last(), Some(&0));
    }
}
