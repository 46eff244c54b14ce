pub mod engine;
pub mod extension;
pub mod model;

pub static APP_USER_AGENT: &str = concat!(
    "Mozilla/5.0 mezo.agent ",
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION"),
);

/// Returns the current unix timestamp in milliseconds.
pub fn unix_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
