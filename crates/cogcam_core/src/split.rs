//! Dataset partition labels.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which partition of the labelled image set a sample belongs to.
///
/// ```rust
/// use cogcam_core::Split;
///
/// assert!(Split::Train.is_train());
/// assert!(Split::Test.is_eval());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Used to fit the classifier head.
    #[default]
    Train,
    /// Monitors epochs and selects the best model.
    Valid,
    /// Held out for the final report and explanations.
    Test,
}

impl Split {
    /// Check if this is the training split.
    #[must_use]
    pub const fn is_train(&self) -> bool {
        matches!(self, Split::Train)
    }

    /// Check if this is an evaluation split (valid or test).
    #[must_use]
    pub const fn is_eval(&self) -> bool {
        !self.is_train()
    }

    /// Lowercase name used in log lines and file names.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_predicates() {
        assert!(Split::Train.is_train());
        assert!(!Split::Valid.is_train());
        assert!(Split::Valid.is_eval());
        assert!(Split::Test.is_eval());
        assert_eq!(Split::default(), Split::Train);
    }

    #[test]
    fn test_split_display() {
        assert_eq!(Split::Valid.to_string(), "valid");
        assert_eq!(serde_json::to_string(&Split::Test).unwrap(), "\"test\"");
    }
}
