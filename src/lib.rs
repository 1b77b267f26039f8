pub mod config;
pub mod congestion;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod health;
pub mod message;
pub mod peer;
pub mod queue;
pub mod record;
pub mod routing;
pub mod session;
pub mod util;
pub mod wire;

#[cfg(test)] pub mod test_util;
