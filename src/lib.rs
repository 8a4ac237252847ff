//! Cycle-accurate verification harness for a design with a pull (input) and a
//! push (output) ready/valid handshake.
//!
//! Everything runs on an in-process discrete event kernel ([`Sim`]) with
//! delta-cycle signal semantics. A run consists of four cooperating processes:
//! the [`Clock`], the [`Driver`] feeding stimulus into the design, the
//! [`Checker`] validating what comes out, and the [`Tracer`] recording
//! waveforms. [`Harness`] wires them around a [`Dut`] and returns a
//! [`RunReport`].

pub mod checker;
pub mod clock;
pub mod config;
pub mod driver;
pub mod dut;
pub mod error;
mod executor;
pub mod harness;
pub mod junit;
pub mod kernel;
pub mod prelude;
pub mod report;
mod shared;
mod signal;
pub mod time;
pub mod tracer;
mod trigger;
pub mod utils;
mod value;

pub use checker::{Checker, CheckerState};
pub use clock::Clock;
pub use config::{ClockConfig, RunConfig, StimulusItem, TraceConfig, TraceEdge};
pub use driver::{Driver, DriverState};
pub use dut::{Dut, DutPorts, PassThrough};
pub use error::{TbError, TbResult};
pub use executor::JoinHandle;
pub use harness::Harness;
pub use kernel::{Sim, SignalInfo, Snapshot};
pub use report::{Fault, ItemVerdict, RunReport, Transfer};
pub use shared::Shared;
pub use signal::{Signal, SignalRef};
pub use time::SimTime;
pub use tracer::{TraceSink, TraceStatus, Tracer, VcdSink};
pub use trigger::{EdgeKind, Trigger};
pub use value::SignalValue;
