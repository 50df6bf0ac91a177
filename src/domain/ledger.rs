use super::{Days, Employee};

/// Check that `days` fit in the employee's remaining allotment without touching it.
/// Used when a request is filed; the authoritative check happens in [`reserve`].
pub fn ensure_available(employee: &Employee, days: Days) -> Result<(), LedgerError> {
    let remaining = employee.remaining_leave();
    if remaining < days {
        return Err(LedgerError::InsufficientBalance {
            remaining,
            requested: days,
        });
    }
    Ok(())
}

/// Debit `days` from the employee's allotment.
///
/// Must be persisted in the same unit of work as the approval that causes it.
pub fn reserve(employee: &mut Employee, days: Days) -> Result<(), LedgerError> {
    if days <= 0 {
        return Err(LedgerError::NonPositive(days));
    }
    ensure_available(employee, days)?;
    employee.used_leave += days;
    Ok(())
}

/// Credit `days` back after an approved leave is cancelled.
///
/// Going below zero means the ledger and the leave records disagree, which is
/// an invariant violation rather than a user error.
pub fn release(employee: &mut Employee, days: Days) -> Result<(), LedgerError> {
    if days <= 0 {
        return Err(LedgerError::NonPositive(days));
    }
    if employee.used_leave < days {
        return Err(LedgerError::Underflow {
            used: employee.used_leave,
            released: days,
        });
    }
    employee.used_leave -= days;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    InsufficientBalance { remaining: Days, requested: Days },
    Underflow { used: Days, released: Days },
    NonPositive(Days),
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::InsufficientBalance {
                remaining,
                requested,
            } => write!(
                f,
                "Insufficient leave balance: {} day(s) remaining, {} requested",
                remaining, requested
            ),
            LedgerError::Underflow { used, released } => write!(
                f,
                "Releasing {} day(s) would drive used leave ({}) below zero",
                released, used
            ),
            LedgerError::NonPositive(days) => {
                write!(f, "Leave day count must be positive, got {}", days)
            }
        }
    }
}

impl std::error::Error for LedgerError {}
