/*!
Defines the [Error] and [Result] types used throughout the crate.

Every variant carries enough context to map onto the Iceberg REST error
shapes, see [Error::error_type] and [Error::status_code].
*/

use thiserror::Error;

/// Iceberg error type
#[derive(Error, Debug)]
pub enum Error {
    /// Namespace or table does not exist.
    #[error("{0} {1} not found")]
    NotFound(String, String),
    /// Namespace, table or id already exists.
    #[error("{0} {1} already exists")]
    AlreadyExists(String, String),
    /// Namespace still contains tables.
    #[error("namespace {0} is not empty")]
    NotEmpty(String),
    /// Schema, partition spec or sort order is structurally invalid.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Metadata JSON or a manifest could not be decoded.
    #[error("failed to parse metadata: {0}")]
    MetadataParse(String),
    /// Avro binary data could not be encoded or decoded.
    #[error("avro codec error: {0}")]
    Avro(String),
    /// A commit requirement failed and could not be rebased.
    #[error("commit conflict: requirement {requirement} failed: {message}")]
    CommitConflict {
        /// The `type` tag of the failing requirement.
        requirement: String,
        /// What the requirement expected vs what was observed.
        message: String,
    },
    /// The commit retry budget was exhausted.
    #[error("commit failed after {0} retries")]
    CommitRetryExhausted(u32),
    /// The metadata pointer was not advanced; orphan files remain.
    #[error("commit transaction failed, {} orphan files left behind", orphans.len())]
    CommitTransaction {
        /// Paths written during the failed commit that were not published.
        orphans: Vec<String>,
        /// The underlying failure.
        message: String,
    },
    /// A partition transform could not be applied to a value.
    #[error("cannot apply transform {0} to {1}")]
    Transform(String, String),
    /// No identity was supplied for an operation that requires one.
    #[error("not authorized")]
    Unauthorized,
    /// The identity lacks the required permission level.
    #[error("forbidden: {0} access to {1} required")]
    Forbidden(String, String),
    /// Feature is not supported by this implementation.
    #[error("feature {0} is not supported")]
    NotSupported(String),
    /// Objectstore error
    #[error("object store error")]
    ObjectStore(#[from] object_store::Error),
    /// Serde json
    #[error("serde json error")]
    JSONSerde(#[from] serde_json::Error),
    /// Chrono parse
    #[error("chrono parse error")]
    Chrono(#[from] chrono::ParseError),
    /// Uuid error
    #[error("uuid error")]
    Uuid(#[from] uuid::Error),
    /// Io error
    #[error("io error")]
    IO(#[from] std::io::Error),
    /// Try from slice error
    #[error("try from slice error")]
    TryFromSlice(#[from] std::array::TryFromSliceError),
    /// Try from int error
    #[error("try from int error")]
    TryFromInt(#[from] std::num::TryFromIntError),
    /// Utf8 error
    #[error("utf8 error")]
    UTF8(#[from] std::str::Utf8Error),
    /// From utf8 error
    #[error("from utf8 error")]
    FromUTF8(#[from] std::string::FromUtf8Error),
    /// Parse int error
    #[error("parse int error")]
    ParseInt(#[from] std::num::ParseIntError),
}

impl Error {
    /// The Iceberg REST exception name for this error.
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::NotFound(kind, _) if kind == "Namespace" => "NoSuchNamespaceException",
            Error::NotFound(..) => "NoSuchTableException",
            Error::AlreadyExists(..) => "AlreadyExistsException",
            Error::NotEmpty(..) => "NamespaceNotEmptyException",
            Error::Validation(..) | Error::Transform(..) | Error::NotSupported(..) => {
                "BadRequestException"
            }
            Error::MetadataParse(..) | Error::Avro(..) | Error::JSONSerde(..) => {
                "BadRequestException"
            }
            Error::CommitConflict { .. } | Error::CommitRetryExhausted(..) => {
                "CommitFailedException"
            }
            Error::CommitTransaction { .. } => "CommitStateUnknownException",
            Error::Unauthorized => "NotAuthorizedException",
            Error::Forbidden(..) => "ForbiddenException",
            Error::ObjectStore(..) | Error::IO(..) => "ServiceUnavailableException",
            _ => "InternalServerError",
        }
    }

    /// The HTTP status the REST surface reports for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(..) => 404,
            Error::AlreadyExists(..)
            | Error::NotEmpty(..)
            | Error::CommitConflict { .. }
            | Error::CommitRetryExhausted(..) => 409,
            Error::Validation(..)
            | Error::Transform(..)
            | Error::NotSupported(..)
            | Error::MetadataParse(..)
            | Error::Avro(..)
            | Error::JSONSerde(..) => 400,
            Error::Unauthorized => 401,
            Error::Forbidden(..) => 403,
            Error::ObjectStore(..) | Error::IO(..) => 503,
            Error::CommitTransaction { .. } => 500,
            _ => 500,
        }
    }
}

/// Iceberg result type
pub type Result<T> = std::result::Result<T, Error>;
