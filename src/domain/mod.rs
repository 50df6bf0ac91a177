mod company;
mod employee;
mod leave;
mod ledger;
mod notification;

pub use company::*;
pub use employee::*;
pub use leave::*;
pub use ledger::*;
pub use notification::*;

/// Leave is accounted in whole days.
pub type Days = i64;
