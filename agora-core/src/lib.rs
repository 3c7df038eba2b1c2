mod cascade;
pub use cascade::descendants;

mod error;
pub use error::Error;

mod feed;
pub use feed::assemble_feed;

mod forum;
pub use forum::Forum;

mod ledger;
pub use ledger::{apply_vote, vote_counts};

mod materialize;
pub use materialize::materialize;

mod rank;
pub use rank::RankExt;

pub mod api {
    pub use agora_api::*;
}

pub mod prelude {
    pub use crate::RankExt;
}

#[cfg(test)]
mod fuzz;
