#![doc = include_str!("../README.md")]
pub mod assignment;
pub mod configuration;
pub mod driver;
pub mod error;
pub mod field;
pub mod line_reader;
pub mod logging;
pub mod mission;
pub mod motion;
pub mod range_sensor;
pub mod simulation;
pub mod vision;
