//! Contracts with the challenge platform challengebox is embedded in.
//!
//! The platform owns sessions, flags, scoring and challenge storage. challengebox only consumes
//! them through the traits in this module.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::{
    challenge::DockerChallenge,
    models::{Owner, OwnerKind},
    ChallengeboxResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Header carrying the current owner's id.
pub const OWNER_ID_HEADER: &str = "x-owner-id";

/// Header carrying the current owner's display name.
pub const OWNER_NAME_HEADER: &str = "x-owner-name";

/// Header set to `true` or `1` for administrators.
pub const ADMIN_HEADER: &str = "x-admin";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The team or user the caller acts for.
    pub owner: Owner,

    /// Whether the caller is an administrator.
    pub is_admin: bool,
}

/// A flag submission, as recorded by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// The challenge the submission is for.
    pub challenge_id: i64,

    /// Team or user id of the submitter.
    pub owner_id: String,

    /// Team or user.
    pub owner_kind: OwnerKind,

    /// The submitted text, trimmed.
    pub provided: String,

    /// The submitter's address, when known.
    pub ip: Option<String>,
}

/// Resolves the caller of a request from its headers.
///
/// The default resolver trusts headers set by the platform's reverse proxy.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderOwnerResolver {
    owner_kind: OwnerKind,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Turns request headers into a [`Session`].
pub trait OwnerResolver: Send + Sync {
    /// The caller of a request, or `None` when unauthenticated.
    fn resolve(&self, headers: &HeaderMap) -> Option<Session>;
}

/// Flag checking, scoring and challenge storage provided by the platform.
#[async_trait::async_trait]
pub trait ChallengePlatform: Send + Sync {
    /// Whether `submission` matches any flag of the challenge.
    async fn compare_flag(&self, challenge_id: i64, submission: &str) -> ChallengeboxResult<bool>;

    /// Records a correct submission.
    async fn record_solve(&self, submission: &Submission) -> ChallengeboxResult<()>;

    /// Records a wrong submission.
    async fn record_fail(&self, submission: &Submission) -> ChallengeboxResult<()>;

    /// Stores a challenge and returns its id. A challenge that has an id is overwritten.
    async fn persist_challenge(&self, challenge: &DockerChallenge) -> ChallengeboxResult<i64>;

    /// Loads a challenge.
    async fn load_challenge(&self, id: i64) -> ChallengeboxResult<Option<DockerChallenge>>;

    /// Deletes a challenge together with its solves, fails, flags, files, tags and hints.
    async fn delete_challenge(&self, id: i64) -> ChallengeboxResult<()>;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl HeaderOwnerResolver {
    /// A resolver producing owners of `owner_kind`.
    pub fn new(owner_kind: OwnerKind) -> Self {
        Self { owner_kind }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl OwnerResolver for HeaderOwnerResolver {
    fn resolve(&self, headers: &HeaderMap) -> Option<Session> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let id = header(OWNER_ID_HEADER)?;
        let name = header(OWNER_NAME_HEADER).unwrap_or(id);
        let is_admin = header(ADMIN_HEADER)
            .map(|value| value.eq_ignore_ascii_case("true") || value == "1")
            .unwrap_or(false);

        Some(Session {
            owner: Owner::new(self.owner_kind, id, name),
            is_admin,
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
