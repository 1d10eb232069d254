mod common;

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use challengebox::{
    challenge::{ChallengeState, ChallengeUpdate, DockerChallenge, DockerChallengeType},
    lifecycle::ManualClock,
    platform::{ChallengePlatform, Submission},
    ChallengeboxError, ChallengeboxResult,
};
use common::FakeEngine;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A platform that keeps challenges and submissions in memory. The flag of every challenge is
/// `flag{<id>}`.
#[derive(Default)]
struct MemoryPlatform {
    challenges: Mutex<BTreeMap<i64, DockerChallenge>>,
    solves: Mutex<Vec<Submission>>,
    fails: Mutex<Vec<Submission>>,
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait::async_trait]
impl ChallengePlatform for MemoryPlatform {
    async fn compare_flag(&self, challenge_id: i64, submission: &str) -> ChallengeboxResult<bool> {
        Ok(submission == format!("flag{{{challenge_id}}}"))
    }

    async fn record_solve(&self, submission: &Submission) -> ChallengeboxResult<()> {
        self.solves.lock().unwrap().push(submission.clone());
        Ok(())
    }

    async fn record_fail(&self, submission: &Submission) -> ChallengeboxResult<()> {
        self.fails.lock().unwrap().push(submission.clone());
        Ok(())
    }

    async fn persist_challenge(&self, challenge: &DockerChallenge) -> ChallengeboxResult<i64> {
        let mut challenges = self.challenges.lock().unwrap();
        let id = match challenge.get_id() {
            Some(id) => *id,
            None => challenges.keys().next_back().map_or(1, |last| last + 1),
        };

        // Round-trip through JSON so the stored copy carries its id.
        let mut value = serde_json::to_value(challenge)?;
        value["id"] = id.into();
        challenges.insert(id, serde_json::from_value(value)?);
        Ok(id)
    }

    async fn load_challenge(&self, id: i64) -> ChallengeboxResult<Option<DockerChallenge>> {
        Ok(self.challenges.lock().unwrap().get(&id).cloned())
    }

    async fn delete_challenge(&self, id: i64) -> ChallengeboxResult<()> {
        self.challenges.lock().unwrap().remove(&id);
        self.solves.lock().unwrap().retain(|s| s.challenge_id != id);
        self.fails.lock().unwrap().retain(|s| s.challenge_id != id);
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn setup() -> anyhow::Result<(
    DockerChallengeType,
    Arc<MemoryPlatform>,
    Arc<FakeEngine>,
    Arc<challengebox::lifecycle::LifecycleManager>,
)> {
    let engine = Arc::new(FakeEngine::default().with_image("web:latest", &["80/tcp"]));
    let manager = Arc::new(common::manager(engine.clone(), ManualClock::new(0)).await?);
    common::register_host(&manager, "1", "10.0.0.5:2375").await?;

    let platform = Arc::new(MemoryPlatform::default());
    let challenge_type = DockerChallengeType::new(platform.clone(), manager.clone());
    Ok((challenge_type, platform, engine, manager))
}

fn web_challenge() -> anyhow::Result<DockerChallenge> {
    Ok(DockerChallenge::builder()
        .name("web 101")
        .category("web")
        .value(100)
        .docker_image("web".parse()?)
        .build())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_challenge_crud() -> anyhow::Result<()> {
    let (challenge_type, _, _, _) = setup().await?;

    let created = challenge_type.create(web_challenge()?).await?;
    let id = created.get_id().unwrap();

    let view = challenge_type.read(id).await?;
    assert_eq!(view.kind, "docker");
    assert_eq!(view.challenge, created);

    let updated = challenge_type
        .update(
            id,
            ChallengeUpdate {
                value: Some(300),
                state: Some(ChallengeState::Hidden),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(*updated.get_value(), 300);
    assert_eq!(challenge_type.read(id).await?.challenge, updated);

    challenge_type.delete(id).await?;
    assert!(matches!(
        challenge_type.read(id).await,
        Err(ChallengeboxError::ChallengeNotFound(_))
    ));
    assert!(matches!(
        challenge_type.delete(id).await,
        Err(ChallengeboxError::ChallengeNotFound(_))
    ));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_challenge_attempt_and_fail() -> anyhow::Result<()> {
    let (challenge_type, platform, _, manager) = setup().await?;
    let challenge = challenge_type.create(web_challenge()?).await?;
    let owner = manager.owner("1", "rocket");

    let outcome = challenge_type.attempt(&challenge, "  flag{1}\n").await?;
    assert!(outcome.correct);
    assert_eq!(outcome.message, "Correct");

    let outcome = challenge_type.attempt(&challenge, "flag{2}").await?;
    assert!(!outcome.correct);
    assert_eq!(outcome.message, "Incorrect");

    challenge_type
        .fail(&owner, &challenge, " flag{2} ", Some("10.1.1.1".into()))
        .await?;
    let fails = platform.fails.lock().unwrap().clone();
    assert_eq!(fails.len(), 1);
    assert_eq!(fails[0].provided, "flag{2}");
    assert_eq!(fails[0].ip.as_deref(), Some("10.1.1.1"));

    // A challenge that was never stored cannot be attempted.
    assert!(challenge_type.attempt(&web_challenge()?, "flag{1}").await.is_err());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_challenge_solve_reclaims_container() -> anyhow::Result<()> {
    let (challenge_type, platform, engine, manager) = setup().await?;
    let challenge = challenge_type.create(web_challenge()?).await?;
    let owner = manager.owner("1", "rocket");

    manager.request_container(&owner, "web").await?;
    challenge_type.solve(&owner, &challenge, "flag{1}", None).await?;

    assert!(manager.instances_for(&owner).await?.is_empty());
    assert!(engine.container_ids().is_empty());
    assert_eq!(platform.solves.lock().unwrap().len(), 1);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_challenge_solve_records_without_container() -> anyhow::Result<()> {
    let (challenge_type, platform, engine, manager) = setup().await?;
    let challenge = challenge_type.create(web_challenge()?).await?;

    // Owner 2 has no host config and no instance; the solve still counts.
    let owner = manager.owner("2", "comet");
    challenge_type.solve(&owner, &challenge, "flag{1}", None).await?;

    let solves = platform.solves.lock().unwrap().clone();
    assert_eq!(solves.len(), 1);
    assert_eq!(solves[0].owner_id, "2");
    assert!(engine.calls().is_empty());
    Ok(())
}
