use std::collections::BTreeSet;

use crate::{validate_text, Error, Username};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoteOutcome {
    Applied,
    AlreadyVoted,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct VoteCounts {
    pub upvotes: usize,
    pub downvotes: usize,
    /// upvotes minus downvotes
    pub rate: i64,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct VoteRequest {
    pub username: Username,
}

impl VoteRequest {
    pub fn validate(&self) -> Result<(), Error> {
        validate_text("username", self.username.as_str())
    }
}

/// The two voter sets of an entity
///
/// A voter is in at most one of the two sets. The only ways to build a `Votes`
/// are `Votes::new`, `Votes::from_sets` (which checks the sets are disjoint)
/// and `Votes::apply`, so the invariant holds for every value of this type,
/// including deserialized ones.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "VoteSets")]
pub struct Votes {
    upvotes: BTreeSet<Username>,
    downvotes: BTreeSet<Username>,
}

#[derive(serde::Deserialize)]
struct VoteSets {
    #[serde(default)]
    upvotes: BTreeSet<Username>,
    #[serde(default)]
    downvotes: BTreeSet<Username>,
}

impl TryFrom<VoteSets> for Votes {
    type Error = anyhow::Error;

    fn try_from(s: VoteSets) -> anyhow::Result<Votes> {
        Votes::from_sets(s.upvotes, s.downvotes)
    }
}

impl Votes {
    pub fn new() -> Votes {
        Votes::default()
    }

    pub fn from_sets(
        upvotes: BTreeSet<Username>,
        downvotes: BTreeSet<Username>,
    ) -> anyhow::Result<Votes> {
        if let Some(both) = upvotes.intersection(&downvotes).next() {
            anyhow::bail!("voter {both} is in both the upvote and the downvote sets");
        }
        Ok(Votes { upvotes, downvotes })
    }

    pub fn upvoters(&self) -> &BTreeSet<Username> {
        &self.upvotes
    }

    pub fn downvoters(&self) -> &BTreeSet<Username> {
        &self.downvotes
    }

    pub fn direction_of(&self, voter: &Username) -> Option<VoteDirection> {
        if self.upvotes.contains(voter) {
            Some(VoteDirection::Up)
        } else if self.downvotes.contains(voter) {
            Some(VoteDirection::Down)
        } else {
            None
        }
    }

    /// Record `voter`'s vote, moving it out of the opposite set if needed
    pub fn apply(&mut self, voter: &Username, direction: VoteDirection) -> VoteOutcome {
        let (target, opposite) = match direction {
            VoteDirection::Up => (&mut self.upvotes, &mut self.downvotes),
            VoteDirection::Down => (&mut self.downvotes, &mut self.upvotes),
        };
        if target.contains(voter) {
            return VoteOutcome::AlreadyVoted;
        }
        opposite.remove(voter);
        target.insert(voter.clone());
        VoteOutcome::Applied
    }

    pub fn counts(&self) -> VoteCounts {
        let upvotes = self.upvotes.len();
        let downvotes = self.downvotes.len();
        VoteCounts {
            upvotes,
            downvotes,
            rate: upvotes as i64 - downvotes as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(name: &str) -> Username {
        Username::from(name)
    }

    #[test]
    fn repeated_vote_is_idempotent() {
        let mut v = Votes::new();
        assert_eq!(v.apply(&u("alice"), VoteDirection::Up), VoteOutcome::Applied);
        let before = v.clone();
        assert_eq!(
            v.apply(&u("alice"), VoteDirection::Up),
            VoteOutcome::AlreadyVoted
        );
        assert_eq!(v, before);
    }

    #[test]
    fn switching_direction_moves_the_voter() {
        let mut v = Votes::new();
        v.apply(&u("alice"), VoteDirection::Up);
        v.apply(&u("bob"), VoteDirection::Up);
        assert_eq!(
            v.counts(),
            VoteCounts {
                upvotes: 2,
                downvotes: 0,
                rate: 2
            }
        );

        assert_eq!(
            v.apply(&u("alice"), VoteDirection::Down),
            VoteOutcome::Applied
        );
        assert_eq!(
            v.counts(),
            VoteCounts {
                upvotes: 1,
                downvotes: 1,
                rate: 0
            }
        );
        assert_eq!(v.direction_of(&u("alice")), Some(VoteDirection::Down));
        assert_eq!(v.direction_of(&u("bob")), Some(VoteDirection::Up));
        assert_eq!(v.direction_of(&u("carol")), None);
    }

    #[test]
    fn overlapping_sets_are_rejected() {
        let both = [u("alice")].into_iter().collect::<BTreeSet<_>>();
        assert!(Votes::from_sets(both.clone(), both.clone()).is_err());
        assert!(Votes::from_sets(both, BTreeSet::new()).is_ok());

        let json = r#"{"upvotes":["alice"],"downvotes":["alice"]}"#;
        assert!(serde_json::from_str::<Votes>(json).is_err());
        let json = r#"{"upvotes":["alice"],"downvotes":["bob"]}"#;
        let v: Votes = serde_json::from_str(json).unwrap();
        assert_eq!(v.counts().rate, 0);
    }
}
