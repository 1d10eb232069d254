use std::{
    error::Error,
    fmt::{self, Display},
};
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a challengebox-related operation.
pub type ChallengeboxResult<T> = Result<T, ChallengeboxError>;

/// An error that occurred while provisioning or reclaiming challenge containers.
#[derive(Debug, Error)]
pub enum ChallengeboxError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// The container engine could not be reached, or the call timed out.
    #[error("container engine unreachable: {0}")]
    EngineUnreachable(String),

    /// The container engine replied with something that is not the expected JSON shape.
    #[error("container engine protocol error: {0}")]
    EngineProtocolError(String),

    /// The container engine answered with a non-success status.
    #[error("container engine rejected request ({status}): {message}")]
    EngineRejected {
        /// The HTTP status code returned by the engine.
        status: u16,

        /// The message the engine attached to the rejection.
        message: String,
    },

    /// No host configuration exists for the owner.
    #[error("no container host configured for owner {0}")]
    NoHostConfig(String),

    /// The requested image is not in the host's catalog.
    #[error("image not offered: {0}")]
    ImageNotOffered(String),

    /// The owner already has a fresh instance of the image.
    #[error("instance of {image} was created {age}s ago, revert is allowed after {window}s")]
    TooSoon {
        /// The image the owner asked for.
        image: String,

        /// Seconds since the existing instance was created.
        age: i64,

        /// The minimum age before a revert is allowed.
        window: i64,
    },

    /// An instance already occupies the (owner, image) slot.
    #[error("an instance already exists for owner {owner} and image {image}")]
    DuplicateSlot {
        /// The owner of the slot.
        owner: String,

        /// The image of the slot.
        image: String,
    },

    /// No free host ports could be found within the attempt budget.
    #[error("could not allocate {needed} host port(s) after {attempts} attempts")]
    PortExhausted {
        /// Number of ports that were requested.
        needed: usize,

        /// Number of draws made before giving up.
        attempts: usize,
    },

    /// A host configuration failed validation.
    #[error("invalid host configuration: {0}")]
    InvalidHostConfig(String),

    /// An image reference could not be parsed.
    #[error("invalid image reference: {0}")]
    InvalidImageReference(String),

    /// An owner kind string was not recognized.
    #[error("invalid owner kind: {0}")]
    InvalidOwnerKind(String),

    /// A tracked instance was not found.
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    /// A challenge was not found.
    #[error("challenge not found: {0}")]
    ChallengeNotFound(i64),

    /// A database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error.
    #[error("database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A configuration file parse error.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ChallengeboxError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> ChallengeboxError {
        ChallengeboxError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Whether the error came from talking to the container engine.
    pub fn is_engine_error(&self) -> bool {
        matches!(
            self,
            Self::EngineUnreachable(_) | Self::EngineProtocolError(_) | Self::EngineRejected { .. }
        )
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `ChallengeboxResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> ChallengeboxResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
