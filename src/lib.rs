//! # Bench Sweep Core Library
//!
//! Automation for a bench made of a digital oscilloscope and a two-channel function
//! generator, both driven by SCPI text commands. The library holds everything except the
//! operator interface: transports, typed instrument controllers, and a sweep engine that
//! steps the generator through shapes, frequencies and amplitudes while the oscilloscope
//! measures the result.
//!
//! ## Crate Structure
//!
//! - **`transport`**: The `Transport` trait and its two variants. `BusTransport` talks to the
//!   oscilloscope over a message-based instrument bus (VISA, behind the `instrument_visa`
//!   feature); `SocketTransport` talks to the generator over a raw TCP socket on port 5025.
//!   Also IEEE 488.2 binary block framing and an in-memory `MockTransport`.
//! - **`instrument`**: `Oscilloscope` and `FunctionGenerator` controllers, channel and shape
//!   types, measurement kinds.
//! - **`sweep`**: `SweepEngine`, the sweep plan, tolerance and retry rules, statistics and the
//!   final report.
//! - **`bench`**: `Bench`, owner of both controllers, and the `InstrumentConnector` seam.
//! - **`sim`**: A simulated bench for running everything without hardware.
//! - **`display`**: The live waveform refresh loop.
//! - **`status`**: Status-line events and sinks for the presentation layer.
//! - **`scpi`**: Number formatting and response parsing shared by both controllers.
//! - **`config`**: Figment-based configuration (TOML file plus `BENCH_SWEEP_` environment).
//! - **`logging`**: `tracing-subscriber` initialization.
//! - **`error`**: The `BenchError` enum.

pub mod bench;
pub mod config;
pub mod display;
pub mod error;
pub mod instrument;
pub mod logging;
pub mod scpi;
pub mod sim;
pub mod status;
pub mod sweep;
pub mod transport;

pub use bench::{Bench, HardwareConnector, InstrumentConnector};
pub use error::{BenchError, BenchResult};
pub use sweep::{SweepEngine, SweepPlan, SweepReport, SweepState};
