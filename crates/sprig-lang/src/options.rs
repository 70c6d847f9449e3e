//! Per-session configuration.

use crate::runtime::random::DEFAULT_SEED;

/// Options for one expansion session.
///
/// # Example
///
/// ```
/// use sprig_lang::SessionOptions;
///
/// let options = SessionOptions::default().with_seed(42).with_variation("ABC");
/// assert_eq!(options.seed, 42);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Initial random state.
    ///
    /// Default: the generator's default seed
    pub seed: u64,

    /// Text mixed into the seed before the start shape's name, so one seed
    /// yields a family of distinct renders.
    ///
    /// Default: None
    pub variation: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            variation: None,
        }
    }
}

impl SessionOptions {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_variation(mut self, variation: impl Into<String>) -> Self {
        self.variation = Some(variation.into());
        self
    }
}
