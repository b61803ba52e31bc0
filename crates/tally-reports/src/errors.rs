use chrono::NaiveDate;
use std::path::PathBuf;
use tally_backend::BackendError;
use thiserror::Error;

/// Exit code for malformed operator input.
pub const EXIT_INPUT: u8 = 2;
/// Exit code for observed data that does not have the expected shape.
pub const EXIT_DATA_SHAPE: u8 = 3;
/// Exit code for every other failure.
pub const EXIT_FAILURE: u8 = 1;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Error parsing date from '{input}'. Should be in YYYYMMDD form. Error: {source}")]
    InvalidDate {
        input: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Unknown run mode '{mode}'. Should be either 'weekly' or 'monthly'")]
    UnknownMode { mode: String },

    #[error("Failed to read {}: {source}", path.display())]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error parsing JSON from {}: {source}", path.display())]
    MalformedJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to load configuration file: {}\n{source}", path.display())]
    ConfigLoadError {
        path: PathBuf,
        source: anyhow::Error,
    },

    #[error("Missing required setting '{name}'.\nHint: pass it on the command line or set it in tally.yml")]
    MissingSetting { name: &'static str },

    #[error("No data to process: {start} - {end}")]
    EmptyDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Data error: {message}")]
    DataShape { message: String },

    #[error("Object storage error for {bucket}/{path}: {source}")]
    Storage {
        bucket: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to send alert email: {message}")]
    AlertFailed { message: String },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ReportError {
    pub fn data_shape(message: impl Into<String>) -> Self {
        Self::DataShape {
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            ReportError::InvalidDate { .. }
            | ReportError::UnknownMode { .. }
            | ReportError::ReadInput { .. }
            | ReportError::MalformedJson { .. }
            | ReportError::ConfigLoadError { .. }
            | ReportError::MissingSetting { .. }
            | ReportError::EmptyDateRange { .. } => EXIT_INPUT,
            ReportError::DataShape { .. } => EXIT_DATA_SHAPE,
            ReportError::Storage { .. }
            | ReportError::AlertFailed { .. }
            | ReportError::Backend(_) => EXIT_FAILURE,
        }
    }
}

/// Exit code for an error chain: the first [`ReportError`] in it decides.
pub fn exit_code_for(error: &anyhow::Error) -> u8 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ReportError>())
        .map_or(EXIT_FAILURE, ReportError::exit_code)
}

/// Parse a `YYYYMMDD` date as given on the command line.
pub fn parse_day(input: &str) -> Result<NaiveDate, ReportError> {
    NaiveDate::parse_from_str(input, "%Y%m%d").map_err(|source| ReportError::InvalidDate {
        input: input.to_string(),
        source,
    })
}
