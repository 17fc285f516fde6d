use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PorterError {
    #[error("communication with motor driver failed")]
    CommError,
    #[error("failed opening serial port {0:?}")]
    FailedOpeningSerialPort(String),
    #[error("motor driver did not acknowledge {0} command")]
    MissingAcknowledgement(&'static str),
    #[error("malformed frame from motor driver")]
    MalformedFrame,
    #[error("serial port closed")]
    PortClosed,
    #[error("failed to parse range reading {0:?}")]
    RangeParse(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Raised when a box cannot be mapped onto a pallet of the field layout
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    #[error("no pallet with id {0} in field layout")]
    MissingPallet(u8),
    #[error("no pallet other than 2 available for box 2")]
    NoAlternativePallet,
}
