use std::{future::Future, pin::Pin};

pub mod json;
pub mod model;
pub mod rpc;
pub mod tool;

pub use json::*;
pub use model::*;
pub use rpc::*;
pub use tool::*;

/// A type alias for a boxed error that is thread-safe and sendable across threads.
/// This is commonly used as a return type for functions that can return various error types.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A type alias for a boxed future that is thread-safe and sendable across threads.
pub type BoxPinFut<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A type alias for a JSON value.
pub type Json = serde_json::Value;

/// Validates a tool or agent name.
///
/// # Rules
/// - Must not be empty
/// - Length must be ≤ 64 characters
/// - Can only contain: lowercase letters (a-z), digits (0-9), and underscores (_)
pub fn validate_function_name(name: &str) -> Result<(), BoxError> {
    if name.is_empty() {
        return Err("empty string".into());
    }

    if name.len() > 64 {
        return Err(format!("name {name:?} is too long, max length is 64").into());
    }

    for c in name.chars() {
        if !matches!(c, 'a'..='z' | '0'..='9' | '_') {
            return Err(format!("invalid character {c:?} in name {name:?}").into());
        }
    }
    Ok(())
}
