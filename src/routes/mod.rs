mod health_check;
mod send;
mod update;

pub use health_check::health_check;
pub use send::{handle_send, MAX_SEND_BODY_BYTES};
pub use update::handle_update;
