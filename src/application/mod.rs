// Application layer: the leave lifecycle orchestrator and the collaborators it
// is wired with (clock, cache, push channel, permission policy).

mod access;
mod cache;
mod clock;
mod config;
mod effects;
mod error;
pub mod notify;
mod reporting;
mod service;

pub use access::*;
pub use cache::*;
pub use clock::*;
pub use config::*;
pub use effects::*;
pub use error::*;
pub use notify::{BroadcastPush, LogPush, PushChannel, PushError, PushKind, PushMessage};
pub use reporting::*;
pub use service::*;
