//! Per-cell value transitions.
//!
//! Aggregation contexts decide whether a cell adds, retracts or replaces its
//! contribution purely from its `ValueTransition`, never from the raw values.

/// How a single cell changed between two processing steps.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueTransition {
    /// Valid before and after, equal values.
    Unchanged = 0,
    /// Invalid before and after.
    NullToNull = 1,
    /// The row did not exist before and the cell is valid now.
    Appeared = 2,
    /// The row existed with an invalid cell that is valid now.
    Filled = 3,
    /// The row still exists but the cell became invalid.
    Vanished = 4,
    /// Valid before and after, different values.
    Changed = 5,
    /// The row was deleted and re-inserted in one batch; the whole image
    /// was replaced.
    Replaced = 6,
    /// The row was deleted.
    Deleted = 7,
}

impl ValueTransition {
    /// No aggregate contribution changes.
    #[inline]
    pub fn is_noop(self) -> bool {
        matches!(self, ValueTransition::Unchanged | ValueTransition::NullToNull)
    }

    /// The previous value's contribution must be removed.
    #[inline]
    pub fn retracts(self) -> bool {
        matches!(
            self,
            ValueTransition::Vanished
                | ValueTransition::Deleted
                | ValueTransition::Changed
                | ValueTransition::Replaced
        )
    }

    /// The current value's contribution must be added.
    #[inline]
    pub fn adds(self) -> bool {
        matches!(
            self,
            ValueTransition::Appeared
                | ValueTransition::Filled
                | ValueTransition::Changed
                | ValueTransition::Replaced
        )
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<ValueTransition> {
        Some(match value {
            0 => ValueTransition::Unchanged,
            1 => ValueTransition::NullToNull,
            2 => ValueTransition::Appeared,
            3 => ValueTransition::Filled,
            4 => ValueTransition::Vanished,
            5 => ValueTransition::Changed,
            6 => ValueTransition::Replaced,
            7 => ValueTransition::Deleted,
            _ => return None,
        })
    }
}

/// The boolean inputs of a transition classification for a written row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransitionInputs {
    /// The key had a live gstate row before the batch.
    pub row_pre_existed: bool,
    /// The previous cell was valid.
    pub prev_valid: bool,
    /// The resolved current cell is valid.
    pub cur_valid: bool,
    /// Previous and current values compare equal.
    pub prev_cur_eq: bool,
    /// The row image was replaced (delete then insert within the batch, or
    /// insert after a clear).
    pub reset: bool,
}

impl TransitionInputs {
    /// Classifies an insert or update. Deletes are always `Deleted`.
    pub fn classify(&self) -> ValueTransition {
        if !self.row_pre_existed {
            return if self.cur_valid {
                ValueTransition::Appeared
            } else {
                ValueTransition::NullToNull
            };
        }
        match (self.prev_valid, self.cur_valid) {
            (false, false) => ValueTransition::NullToNull,
            (false, true) => ValueTransition::Filled,
            (true, false) => ValueTransition::Vanished,
            (true, true) if self.reset => ValueTransition::Replaced,
            (true, true) if self.prev_cur_eq => ValueTransition::Unchanged,
            (true, true) => ValueTransition::Changed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(pre: bool, pv: bool, cv: bool, eq: bool, reset: bool) -> ValueTransition {
        TransitionInputs {
            row_pre_existed: pre,
            prev_valid: pv,
            cur_valid: cv,
            prev_cur_eq: eq,
            reset,
        }
        .classify()
    }

    #[test]
    fn test_new_rows() {
        assert_eq!(classify(false, false, true, false, false), ValueTransition::Appeared);
        assert_eq!(classify(false, false, false, false, false), ValueTransition::NullToNull);
        assert_eq!(classify(false, false, true, false, true), ValueTransition::Appeared);
    }

    #[test]
    fn test_existing_rows() {
        assert_eq!(classify(true, true, true, true, false), ValueTransition::Unchanged);
        assert_eq!(classify(true, true, true, false, false), ValueTransition::Changed);
        assert_eq!(classify(true, false, true, false, false), ValueTransition::Filled);
        assert_eq!(classify(true, true, false, false, false), ValueTransition::Vanished);
        assert_eq!(classify(true, false, false, true, false), ValueTransition::NullToNull);
    }

    #[test]
    fn test_reset_rows() {
        // Equal values are still replaced after a reset.
        assert_eq!(classify(true, true, true, true, true), ValueTransition::Replaced);
        assert_eq!(classify(true, true, false, false, true), ValueTransition::Vanished);
        assert_eq!(classify(true, false, true, false, true), ValueTransition::Filled);
    }

    #[test]
    fn test_contribution_classes() {
        for t in 0..8u8 {
            let t = ValueTransition::from_u8(t).unwrap();
            if t.is_noop() {
                assert!(!t.adds() && !t.retracts());
            } else {
                assert!(t.adds() || t.retracts());
            }
        }
        assert!(ValueTransition::Changed.adds() && ValueTransition::Changed.retracts());
        assert_eq!(ValueTransition::from_u8(8), None);
    }
}
