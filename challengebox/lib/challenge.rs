//! The docker challenge type: challenge records that come with a per-owner container.

use std::sync::Arc;

use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    config::ImageRef,
    lifecycle::LifecycleManager,
    models::Owner,
    platform::{ChallengePlatform, Submission},
    ChallengeboxError, ChallengeboxResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The challenge type identifier.
pub const DOCKER_CHALLENGE_TYPE: &str = "docker";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Whether players can see a challenge.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeState {
    /// Listed for players.
    #[default]
    Visible,

    /// Only visible to administrators.
    Hidden,
}

/// A challenge whose players each get their own container of `docker_image`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct DockerChallenge {
    /// Platform id, absent until persisted.
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    id: Option<i64>,

    /// Title.
    #[builder(setter(into))]
    name: String,

    /// Description shown to players.
    #[serde(default)]
    #[builder(default, setter(into))]
    description: String,

    /// Category.
    #[serde(default)]
    #[builder(default, setter(into))]
    category: String,

    /// Points.
    #[serde(default)]
    #[builder(default)]
    value: i64,

    /// Visibility.
    #[serde(default)]
    #[builder(default)]
    state: ChallengeState,

    /// Maximum wrong attempts, `0` for unlimited.
    #[serde(default)]
    #[builder(default)]
    max_attempts: u32,

    /// The `repository:tag` players get a container of.
    docker_image: ImageRef,
}

/// The fields an administrator may change on a docker challenge. Unknown fields are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChallengeUpdate {
    /// New title.
    pub name: Option<String>,

    /// New description.
    pub description: Option<String>,

    /// New category.
    pub category: Option<String>,

    /// New point value.
    pub value: Option<i64>,

    /// New visibility.
    pub state: Option<ChallengeState>,

    /// New attempt limit.
    pub max_attempts: Option<u32>,

    /// New image.
    pub docker_image: Option<ImageRef>,
}

/// The verdict on a flag submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttemptOutcome {
    /// Whether the submission was correct.
    pub correct: bool,

    /// Message shown to the player.
    pub message: &'static str,
}

/// A challenge as presented to the front end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChallengeView {
    /// The challenge.
    #[serde(flatten)]
    pub challenge: DockerChallenge,

    /// Always [`DOCKER_CHALLENGE_TYPE`].
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// Challenge operations of the docker challenge type.
///
/// Storage and scoring are delegated to the platform; solving additionally reclaims the solver's
/// container.
pub struct DockerChallengeType {
    platform: Arc<dyn ChallengePlatform>,
    lifecycle: Arc<LifecycleManager>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DockerChallenge {
    /// Applies an update. Only the fields listed in [`ChallengeUpdate`] can change.
    pub fn apply(&mut self, update: ChallengeUpdate) {
        let ChallengeUpdate {
            name,
            description,
            category,
            value,
            state,
            max_attempts,
            docker_image,
        } = update;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(description) = description {
            self.description = description;
        }
        if let Some(category) = category {
            self.category = category;
        }
        if let Some(value) = value {
            self.value = value;
        }
        if let Some(state) = state {
            self.state = state;
        }
        if let Some(max_attempts) = max_attempts {
            self.max_attempts = max_attempts;
        }
        if let Some(docker_image) = docker_image {
            self.docker_image = docker_image;
        }
    }

    fn require_id(&self) -> ChallengeboxResult<i64> {
        self.id.ok_or_else(|| {
            ChallengeboxError::custom(anyhow::anyhow!("challenge {:?} is not persisted", self.name))
        })
    }
}

impl DockerChallengeType {
    /// Creates the challenge type over the platform and the lifecycle manager.
    pub fn new(platform: Arc<dyn ChallengePlatform>, lifecycle: Arc<LifecycleManager>) -> Self {
        Self {
            platform,
            lifecycle,
        }
    }

    /// Stores a new challenge.
    pub async fn create(
        &self,
        mut challenge: DockerChallenge,
    ) -> ChallengeboxResult<DockerChallenge> {
        challenge.id = None;
        let id = self.platform.persist_challenge(&challenge).await?;
        challenge.id = Some(id);
        tracing::info!(
            "created docker challenge {} ({}) for {}",
            id,
            challenge.name,
            challenge.docker_image
        );
        Ok(challenge)
    }

    /// The challenge with `id` as presented to the front end.
    pub async fn read(&self, id: i64) -> ChallengeboxResult<ChallengeView> {
        Ok(ChallengeView {
            challenge: self.load(id).await?,
            kind: DOCKER_CHALLENGE_TYPE,
        })
    }

    /// Applies `update` to the challenge with `id` and stores it.
    pub async fn update(
        &self,
        id: i64,
        update: ChallengeUpdate,
    ) -> ChallengeboxResult<DockerChallenge> {
        let mut challenge = self.load(id).await?;
        challenge.apply(update);
        self.platform.persist_challenge(&challenge).await?;
        Ok(challenge)
    }

    /// Deletes the challenge with `id` and everything the platform keeps for it.
    pub async fn delete(&self, id: i64) -> ChallengeboxResult<()> {
        self.load(id).await?;
        self.platform.delete_challenge(id).await?;
        tracing::info!("deleted docker challenge {}", id);
        Ok(())
    }

    /// Checks a submission against the challenge's flags. Nothing is recorded.
    pub async fn attempt(
        &self,
        challenge: &DockerChallenge,
        submission: &str,
    ) -> ChallengeboxResult<AttemptOutcome> {
        let correct = self
            .platform
            .compare_flag(challenge.require_id()?, submission.trim())
            .await?;

        Ok(AttemptOutcome {
            correct,
            message: if correct { "Correct" } else { "Incorrect" },
        })
    }

    /// Records a solve and reclaims the solver's container.
    ///
    /// The solve is recorded even when there is no container or the container could not be
    /// removed.
    pub async fn solve(
        &self,
        owner: &Owner,
        challenge: &DockerChallenge,
        submission: &str,
        ip: Option<String>,
    ) -> ChallengeboxResult<()> {
        let image = challenge.docker_image.to_string();
        if let Err(e) = self.lifecycle.reclaim_on_solve(owner, &image).await {
            tracing::warn!("could not reclaim {} of {} after solve: {}", image, owner, e);
        }

        let submission = self.submission(owner, challenge, submission, ip)?;
        self.platform.record_solve(&submission).await
    }

    /// Records a wrong submission.
    pub async fn fail(
        &self,
        owner: &Owner,
        challenge: &DockerChallenge,
        submission: &str,
        ip: Option<String>,
    ) -> ChallengeboxResult<()> {
        let submission = self.submission(owner, challenge, submission, ip)?;
        self.platform.record_fail(&submission).await
    }

    async fn load(&self, id: i64) -> ChallengeboxResult<DockerChallenge> {
        self.platform
            .load_challenge(id)
            .await?
            .ok_or(ChallengeboxError::ChallengeNotFound(id))
    }

    fn submission(
        &self,
        owner: &Owner,
        challenge: &DockerChallenge,
        provided: &str,
        ip: Option<String>,
    ) -> ChallengeboxResult<Submission> {
        Ok(Submission {
            challenge_id: challenge.require_id()?,
            owner_id: owner.get_id().clone(),
            owner_kind: *owner.get_kind(),
            provided: provided.trim().to_string(),
            ip,
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge() -> anyhow::Result<DockerChallenge> {
        Ok(DockerChallenge::builder()
            .name("web 101")
            .value(100)
            .docker_image("web:latest".parse()?)
            .build())
    }

    #[test]
    fn test_apply_only_touches_given_fields() -> anyhow::Result<()> {
        let mut challenge = challenge()?;
        challenge.apply(ChallengeUpdate {
            value: Some(250),
            docker_image: Some("web:v2".parse()?),
            ..Default::default()
        });

        assert_eq!(challenge.get_name(), "web 101");
        assert_eq!(*challenge.get_value(), 250);
        assert_eq!(challenge.get_docker_image().to_string(), "web:v2");
        Ok(())
    }

    #[test]
    fn test_update_rejects_unknown_fields() {
        let result = serde_json::from_value::<ChallengeUpdate>(serde_json::json!({
            "value": 10,
            "id": 99,
        }));
        assert!(result.is_err());

        let result = serde_json::from_value::<ChallengeUpdate>(serde_json::json!({
            "docker_image": "not an image",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_view_serializes_type() -> anyhow::Result<()> {
        let view = ChallengeView {
            challenge: challenge()?,
            kind: DOCKER_CHALLENGE_TYPE,
        };
        let value = serde_json::to_value(&view)?;
        assert_eq!(value["type"], "docker");
        assert_eq!(value["docker_image"], "web:latest");
        assert_eq!(value["state"], "visible");
        Ok(())
    }
}
