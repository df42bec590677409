//! User accounts: registration, invites and activation

mod delivery;
mod service;

pub use delivery::{InviteDelivery, LogInviteDelivery};
pub use service::UserService;
