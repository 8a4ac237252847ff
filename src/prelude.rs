pub use crate::dut::{Dut, DutPorts, PassThrough};
pub use crate::error::{TbError, TbResult};
pub use crate::executor::JoinHandle;
pub use crate::harness::Harness;
pub use crate::kernel::Sim;
pub use crate::report::{Fault, RunReport};
pub use crate::shared::Shared;
pub use crate::signal::{Signal, SignalRef};
pub use crate::trigger::{EdgeKind, Trigger};
pub use crate::utils;
pub use crate::RunConfig;
