//! Typed controllers for the two bench instruments.
//!
//! Each controller owns exactly one [`Transport`](crate::transport::Transport) and turns
//! domain operations into SCPI commands, validating arguments before anything is sent.

pub mod channel;
pub mod generator;
pub mod measurement;
pub mod oscilloscope;
pub mod shape;

pub use channel::{GeneratorChannel, ScopeChannel};
pub use generator::FunctionGenerator;
pub use measurement::{Measurement, MeasurementResult, Waveform};
pub use oscilloscope::{
    Oscilloscope, TimebaseReference, TriggerSlope, TriggerSweep, TriggerType, WgenSettings,
};
pub use shape::Shape;
