use thiserror::Error;

/// Main error type for the recorder service
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("already recording")]
    AlreadyRecording,

    #[error("already stopped recording")]
    AlreadyStoppedRecording,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("invalid sink organization: {0}")]
    InvalidOrganization(String),

    #[error("invalid sink bucket: {0}")]
    InvalidBucket(String),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Frame serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Broad category of a [`RecorderError`], used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller misuse of the start/stop lifecycle
    StateConflict,
    Configuration,
    Resolution,
    Device,
    Serialization,
    Internal,
}

impl RecorderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecorderError::AlreadyRecording | RecorderError::AlreadyStoppedRecording => {
                ErrorKind::StateConflict
            }
            RecorderError::Config(_) | RecorderError::ConfigParse(_) => ErrorKind::Configuration,
            RecorderError::InvalidOrganization(_)
            | RecorderError::InvalidBucket(_)
            | RecorderError::Sink(_) => ErrorKind::Resolution,
            RecorderError::Device(_) => ErrorKind::Device,
            RecorderError::Serialization(_) => ErrorKind::Serialization,
            RecorderError::Io(_) | RecorderError::Task(_) => ErrorKind::Internal,
        }
    }
}

/// Errors raised by a device collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Write to {item} failed: {reason}")]
    Write { item: String, reason: String },

    #[error("Read from {item} failed: {reason}")]
    Read { item: String, reason: String },
}

/// Errors raised by the time-series sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("InfluxDB request failed: {0}")]
    Influx(#[from] influxdb2::RequestError),

    #[error("Organization {0} not found")]
    OrgNotFound(String),

    #[error("Bucket creation failed: {0}")]
    BucketCreation(String),

    #[error("Point writer is closed")]
    WriterClosed,
}
