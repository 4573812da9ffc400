use crate::record::PartitionId;

/// Why a payload could not become a [`UserRecord`](crate::record::UserRecord).
///
/// Only structural problems are errors; a well-formed object with missing
/// or mistyped optional fields decodes fine (those fields become null).
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a json object")]
    NotAnObject,

    #[error("missing id field")]
    MissingId,

    #[error("id is not a uuid: {0}")]
    InvalidId(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source connect: {0}")]
    Connect(String),

    #[error("topic metadata: {0}")]
    Metadata(String),

    #[error("partition {partition} fetch: {message}")]
    Fetch {
        partition: PartitionId,
        message: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink connect: {0}")]
    Connect(String),

    #[error("schema provisioning: {0}")]
    Provision(String),

    #[error("write: {0}")]
    Write(String),
}
