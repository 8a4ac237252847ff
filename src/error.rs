use thiserror::Error;

/// Fatal harness errors. Checker findings are not errors, see [`crate::report::Fault`].
#[derive(Debug, Error)]
pub enum TbError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("unknown time unit '{0}'")]
    UnknownTimeUnit(String),
    #[error("can't convert {value} {unit} to sim steps without rounding (precision 1e{precision} s)")]
    TimeNotRepresentable {
        value: u64,
        unit: String,
        precision: i8,
    },
    #[error("exceeded {max} delta rounds at time step {time}")]
    DeltaOverflow { time: u64, max: u32 },
    #[error("trace sink unavailable: {0}")]
    SinkUnavailable(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("junit report error: {0}")]
    Junit(String),
    #[error("task '{0}' was cancelled")]
    Cancelled(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type TbResult<T = ()> = Result<T, TbError>;
