use anyhow::{anyhow, Context};

use crate::{
    api::{CasOutcome, DocumentStore, EntityId, Username, VoteCounts, VoteDirection, VoteOutcome},
    Error,
};

/// Number of optimistic write attempts before giving up on a contended entity
const MAX_CAS_ATTEMPTS: usize = 16;

/// Record `voter`'s vote on `id`
///
/// The caller is responsible for checking that `voter` is a registered user.
/// Moving a voter from one set to the other is written back as a single
/// version-checked update, so concurrent voters on the same entity retry
/// instead of overwriting each other.
pub async fn apply_vote(
    docs: &dyn DocumentStore,
    id: EntityId,
    voter: &Username,
    direction: VoteDirection,
) -> Result<VoteOutcome, Error> {
    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let mut current = docs
            .fetch_votes(id)
            .await
            .with_context(|| format!("fetching votes of {id:?}"))?
            .ok_or_else(|| id.not_found())?;
        if current.value.apply(voter, direction) == VoteOutcome::AlreadyVoted {
            return Ok(VoteOutcome::AlreadyVoted);
        }
        match docs
            .store_votes(id, current.version, &current.value)
            .await
            .with_context(|| format!("storing votes of {id:?}"))?
        {
            CasOutcome::Committed => {
                tracing::debug!(?id, %voter, ?direction, attempt, "vote applied");
                return Ok(VoteOutcome::Applied);
            }
            CasOutcome::Conflict => {
                tracing::debug!(?id, %voter, attempt, "concurrent vote update, retrying");
            }
            CasOutcome::Missing => return Err(id.not_found().into()),
        }
    }
    Err(anyhow!("votes of {id:?} still conflicting after {MAX_CAS_ATTEMPTS} attempts").into())
}

/// Counts of `id`'s votes, computed from the current voter sets
pub async fn vote_counts(docs: &dyn DocumentStore, id: EntityId) -> Result<VoteCounts, Error> {
    Ok(docs
        .fetch_votes(id)
        .await
        .with_context(|| format!("fetching votes of {id:?}"))?
        .ok_or_else(|| id.not_found())?
        .value
        .counts())
}
