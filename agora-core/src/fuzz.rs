#![cfg(test)]

use std::{collections::HashMap, panic::AssertUnwindSafe, sync::Arc};

use agora_mock_server::MockStore;
use bolero::generator::TypeGenerator;

use crate::{
    api::{
        DocumentStore, EntityId, NewComment, NewThread, Username, VoteCounts, VoteDirection,
        VoteOutcome,
    },
    *,
};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            if std::env::var("RUST_LOG").is_ok() {
                let _ = tracing_subscriber::fmt::try_init();
            }
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

const NUM_VOTERS: u8 = 4;

#[derive(Clone, Debug, TypeGenerator)]
struct VoteOp {
    voter: u8,
    on_comment: bool,
    up: bool,
}

/// Votes as a plain map from (entity, voter) to direction
#[derive(Default)]
struct Model(HashMap<(bool, u8), VoteDirection>);

impl Model {
    fn apply(&mut self, op: &VoteOp, direction: VoteDirection) -> VoteOutcome {
        match self.0.insert((op.on_comment, op.voter), direction) {
            Some(d) if d == direction => VoteOutcome::AlreadyVoted,
            _ => VoteOutcome::Applied,
        }
    }

    fn counts(&self, on_comment: bool) -> VoteCounts {
        let of = |dir| {
            self.0
                .iter()
                .filter(|((c, _), d)| *c == on_comment && **d == dir)
                .count()
        };
        let (upvotes, downvotes) = (of(VoteDirection::Up), of(VoteDirection::Down));
        VoteCounts {
            upvotes,
            downvotes,
            rate: upvotes as i64 - downvotes as i64,
        }
    }
}

do_tokio_test!(votes_match_model, Vec<VoteOp>, |ops: Vec<VoteOp>| async move {
    let store = Arc::new(MockStore::new());
    for v in 0..NUM_VOTERS {
        store.add_user(&format!("voter{v}"));
    }
    let forum = Forum::new(store.clone(), store.clone());
    let thread = forum
        .create_thread(NewThread {
            author: Username::from("voter0"),
            title: String::from("title"),
            content: String::from("content"),
        })
        .await
        .expect("creating thread");
    let comment = forum
        .add_comment(
            thread.id.into(),
            NewComment {
                author: Username::from("voter1"),
                content: String::from("comment"),
            },
        )
        .await
        .expect("creating comment");
    let entity = |on_comment: bool| -> EntityId {
        match on_comment {
            true => comment.id.into(),
            false => thread.id.into(),
        }
    };

    let mut model = Model::default();
    for op in ops {
        let voter = Username(format!("voter{}", op.voter % NUM_VOTERS));
        let op = VoteOp {
            voter: op.voter % NUM_VOTERS,
            ..op
        };
        let direction = match op.up {
            true => VoteDirection::Up,
            false => VoteDirection::Down,
        };
        let outcome = forum
            .apply_vote(entity(op.on_comment), &voter, direction)
            .await
            .expect("applying vote");
        assert_eq!(outcome, model.apply(&op, direction), "outcome of {op:?}");

        let votes = store
            .fetch_votes(entity(op.on_comment))
            .await
            .expect("fetching votes")
            .expect("entity disappeared")
            .value;
        assert!(votes.upvoters().is_disjoint(votes.downvoters()));
        assert_eq!(
            vote_counts(&*store, entity(op.on_comment))
                .await
                .expect("counting votes"),
            model.counts(op.on_comment)
        );
    }

    let view = forum.get_thread(thread.id).await.expect("fetching thread");
    assert_eq!(view.counts, model.counts(false));
    assert_eq!(
        view.comments[0].loaded().expect("comment missing").counts,
        model.counts(true)
    );
});
