mod actions;
mod status;

pub use actions::{post_action, Action, ADMIN_SESSION_HEADER};
pub use status::{get_status, health};
