//! Row operation codes carried in the `psp_op` column.

use crate::error::InvariantViolation;

/// Operation applied to a row of an input fragment.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    Insert = 0,
    Update = 1,
    Delete = 2,
    /// Removes every key that was live before this row.
    Clear = 3,
}

impl OpCode {
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn from_u8(value: u8) -> Option<OpCode> {
        match value {
            0 => Some(OpCode::Insert),
            1 => Some(OpCode::Update),
            2 => Some(OpCode::Delete),
            3 => Some(OpCode::Clear),
            _ => None,
        }
    }

    /// Insert and update both write cells.
    #[inline]
    pub fn is_write(self) -> bool {
        matches!(self, OpCode::Insert | OpCode::Update)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = InvariantViolation;

    fn try_from(value: u8) -> core::result::Result<Self, Self::Error> {
        OpCode::from_u8(value).ok_or(InvariantViolation::UnknownOp(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_codes() {
        for op in [OpCode::Insert, OpCode::Update, OpCode::Delete, OpCode::Clear] {
            assert_eq!(OpCode::from_u8(op.as_u8()), Some(op));
        }
        assert_eq!(OpCode::try_from(7u8), Err(InvariantViolation::UnknownOp(7)));
        assert!(OpCode::Update.is_write());
        assert!(!OpCode::Delete.is_write());
    }
}
