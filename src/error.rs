use std::fmt::Debug;
use std::path::PathBuf;

use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("DynamoDB error: {message}")]
    DynamoDb {
        code: Option<String>,
        message: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timeout waiting for table '{0}' to become active")]
    TableActivationTimeout(String),

    #[error("{count} write requests for table '{table}' were still unprocessed after retrying")]
    UnprocessedWrites { table: String, count: usize },

    #[error("Data file {} not found in {}", path.display(), cwd.display())]
    DataFile { path: PathBuf, cwd: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BatchError {
    /// Service error code reported by DynamoDB, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            BatchError::DynamoDb { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// True when DynamoDB rejected the request with `ValidationException`,
    /// which is what it does for duplicate keys inside one batch.
    pub fn is_validation(&self) -> bool {
        self.code() == Some("ValidationException")
    }

    /// True for failures worth sending the same request again: throttling,
    /// service-side faults, and errors that never reached the service.
    pub fn is_transient(&self) -> bool {
        match self {
            BatchError::DynamoDb { code: None, .. } => true,
            BatchError::DynamoDb { code: Some(code), .. } => matches!(
                code.as_str(),
                "LimitExceededException"
                    | "ThrottlingException"
                    | "RequestLimitExceeded"
                    | "ProvisionedThroughputExceededException"
                    | "InternalServerError"
                    | "ServiceUnavailable"
            ),
            _ => false,
        }
    }

    pub(crate) fn from_sdk<E, R>(err: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: Debug,
    {
        BatchError::DynamoDb {
            code: err.code().map(str::to_owned),
            message: DisplayErrorContext(&err).to_string(),
        }
    }

    pub(crate) fn from_build(err: impl std::fmt::Display) -> Self {
        BatchError::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;
