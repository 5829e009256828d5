pub mod credentials;
pub mod guard;
pub mod handlers;
pub mod tokens;

pub use guard::{AuthGuard, Caller, Denial};
