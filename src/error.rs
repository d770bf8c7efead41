use thiserror::Error;

/// Everything that can go wrong while turning user input into a runnable scenario.
///
/// All of these are fatal and are raised before the simulation clock moves.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScenarioError {
    #[error("invalid {selector} selector: {value}")]
    InvalidSelector { selector: &'static str, value: i64 },

    #[error("{transport} transport cannot be used with the {distribution} distribution")]
    IncompatibleSelectors {
        transport: &'static str,
        distribution: &'static str,
    },

    #[error("stop time {stop_time}s is below the minimum of {minimum}s")]
    StopTimeTooShort { stop_time: f64, minimum: f64 },

    #[error("node count must be positive, got {0}")]
    InvalidNodeCount(u32),

    #[error("server count must be between 1 and {max}, got {servers}")]
    InvalidServerCount { servers: u32, max: u32 },

    #[error("packet size must be positive, got {0}")]
    InvalidPacketSize(u64),

    #[error("invalid data rate '{0}'")]
    InvalidDataRate(String),

    #[error("{packet_size}-byte packets at {data_rate} would be sent less than 1ns apart")]
    RateTooHigh { packet_size: u32, data_rate: String },

    #[error("invalid address block '{0}'")]
    InvalidAddressBlock(String),

    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error("malformed routing configuration: {0}")]
    MalformedRouting(String),

    #[error("address block {block} holds {capacity} hosts, {requested} requested")]
    AddressExhausted {
        block: String,
        capacity: u32,
        requested: u32,
    },

    #[error("node {0} has no network address")]
    UnaddressedNode(u32),

    #[error("invalid flow: {0}")]
    InvalidFlow(String),
}

pub type ScenarioResult<T> = Result<T, ScenarioError>;
