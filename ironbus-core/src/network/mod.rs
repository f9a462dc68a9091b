//! Session-level networking — the per-connection receive and send engines.

pub mod session;

pub use session::{Session, SessionHandler, SessionSender};
