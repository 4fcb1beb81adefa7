use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("cheat limit must be > 0")]
    InvalidCheatLimit,
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Policy knobs for a timed attempt.
///
/// The defaults match the classroom setup: three strikes before the attempt is
/// submitted automatically and five marks per correct answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSettings {
    cheat_limit: u32,
    points_per_question: u32,
}

impl AttemptSettings {
    pub const DEFAULT_CHEAT_LIMIT: u32 = 3;
    pub const DEFAULT_POINTS_PER_QUESTION: u32 = 5;

    /// Creates custom attempt settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidCheatLimit` if `cheat_limit` is zero.
    pub fn new(cheat_limit: u32, points_per_question: u32) -> Result<Self, SettingsError> {
        if cheat_limit == 0 {
            return Err(SettingsError::InvalidCheatLimit);
        }
        Ok(Self {
            cheat_limit,
            points_per_question,
        })
    }

    #[must_use]
    pub fn cheat_limit(&self) -> u32 {
        self.cheat_limit
    }

    #[must_use]
    pub fn points_per_question(&self) -> u32 {
        self.points_per_question
    }

    pub(crate) fn validate(self) -> Result<Self, SettingsError> {
        Self::new(self.cheat_limit, self.points_per_question)
    }
}

impl Default for AttemptSettings {
    fn default() -> Self {
        Self {
            cheat_limit: Self::DEFAULT_CHEAT_LIMIT,
            points_per_question: Self::DEFAULT_POINTS_PER_QUESTION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classroom_policy() {
        let settings = AttemptSettings::default();
        assert_eq!(settings.cheat_limit(), 3);
        assert_eq!(settings.points_per_question(), 5);
    }

    #[test]
    fn zero_cheat_limit_is_rejected() {
        assert_eq!(
            AttemptSettings::new(0, 5).unwrap_err(),
            SettingsError::InvalidCheatLimit
        );
    }

    #[test]
    fn zero_points_is_allowed() {
        let settings = AttemptSettings::new(1, 0).unwrap();
        assert_eq!(settings.points_per_question(), 0);
    }
}
