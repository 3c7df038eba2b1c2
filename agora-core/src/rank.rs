use std::cmp::Reverse;

use crate::api::{RankedView, SortMode, Thread};

pub trait RankExt {
    /// Annotate `threads` with their vote counts and order them
    ///
    /// Sorting is stable: threads that compare equal keep their input order.
    fn rank<'a, I>(&self, threads: I) -> std::vec::IntoIter<RankedView>
    where
        I: IntoIterator<Item = &'a Thread>;
}

impl RankExt for SortMode {
    fn rank<'a, I>(&self, threads: I) -> std::vec::IntoIter<RankedView>
    where
        I: IntoIterator<Item = &'a Thread>,
    {
        let mut views = threads
            .into_iter()
            .map(|t| RankedView {
                id: t.id,
                author: t.author.clone(),
                title: t.title.clone(),
                content: t.content.clone(),
                counts: t.votes.counts(),
            })
            .collect::<Vec<_>>();
        match self {
            SortMode::Default => (),
            SortMode::Upvotes => views.sort_by_key(|v| Reverse(v.counts.upvotes)),
            SortMode::Rate => views.sort_by_key(|v| Reverse(v.counts.rate)),
        }
        views.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{NewThread, ThreadId, Username, Uuid, VoteDirection};

    /// A thread titled `title` with `up` upvoters and `down` downvoters
    fn thread(title: &str, up: usize, down: usize) -> Thread {
        let mut t = NewThread {
            author: Username::from("alice"),
            title: String::from(title),
            content: String::from("content"),
        }
        .into_thread(ThreadId(Uuid::new_v4()));
        for i in 0..up {
            t.votes
                .apply(&Username(format!("up{i}")), VoteDirection::Up);
        }
        for i in 0..down {
            t.votes
                .apply(&Username(format!("down{i}")), VoteDirection::Down);
        }
        t
    }

    fn titles(views: impl Iterator<Item = RankedView>) -> Vec<String> {
        views.map(|v| v.title).collect()
    }

    fn sample() -> Vec<Thread> {
        vec![
            thread("a", 1, 0),
            thread("b", 3, 3),
            thread("c", 2, 0),
            thread("d", 1, 0),
            thread("e", 3, 0),
        ]
    }

    #[test]
    fn default_keeps_input_order() {
        let threads = sample();
        let ranked = SortMode::Default.rank(&threads).collect::<Vec<_>>();
        assert_eq!(
            titles(ranked.iter().cloned()),
            vec!["a", "b", "c", "d", "e"]
        );
        assert_eq!(ranked[1].counts.upvotes, 3);
        assert_eq!(ranked[1].counts.downvotes, 3);
        assert_eq!(ranked[1].counts.rate, 0);
    }

    #[test]
    fn upvotes_is_stable_descending() {
        let threads = sample();
        assert_eq!(
            titles(SortMode::Upvotes.rank(&threads)),
            vec!["b", "e", "c", "a", "d"]
        );
    }

    #[test]
    fn rate_is_stable_descending() {
        let threads = sample();
        assert_eq!(
            titles(SortMode::Rate.rank(&threads)),
            vec!["e", "c", "a", "d", "b"]
        );
    }

    #[test]
    fn sources_are_untouched() {
        let threads = sample();
        let before = threads.clone();
        let _ = SortMode::Rate.rank(&threads).count();
        assert_eq!(threads, before);
    }
}
