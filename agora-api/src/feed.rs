use std::str::FromStr;

use crate::Error;

/// Maximum number of friendship edges a feed expands over, always at least 1
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Serialize)]
pub struct FeedDepth(u32);

impl FeedDepth {
    pub fn new(depth: i64) -> Result<FeedDepth, Error> {
        if depth <= 0 {
            return Err(Error::InvalidDepth(depth.to_string()));
        }
        u32::try_from(depth)
            .map(FeedDepth)
            .map_err(|_| Error::InvalidDepth(depth.to_string()))
    }

    pub fn hops(&self) -> u32 {
        self.0
    }
}

impl FromStr for FeedDepth {
    type Err = Error;

    fn from_str(s: &str) -> Result<FeedDepth, Error> {
        let depth = s
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::InvalidDepth(String::from(s)))?;
        FeedDepth::new(depth)
    }
}
