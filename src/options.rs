use crate::error::{Error, Result};

pub const DEFAULT_MAX_LEVEL: usize = 12;

/// Construction parameters for a [`SkipList`](crate::SkipList).
///
/// `max_level` is the highest level index a tower may reach, so the header
/// carries `max_level + 1` forward slots. A fixed `seed` makes the level
/// draws, and therefore the shape of the list, reproducible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    pub max_level: usize,
    pub seed: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_level: DEFAULT_MAX_LEVEL,
            seed: None,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_level(mut self, max_level: usize) -> Self {
        self.max_level = max_level;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_level == 0 {
            return Err(Error::InvalidMaxLevel(self.max_level));
        }
        Ok(())
    }
}
