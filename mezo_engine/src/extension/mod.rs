//! Extension module providing agent capabilities built on top of the model
//!
//! - [`extractor`]: structured data extraction from free text
//! - [`character`]: character profiles and the character chat tool

pub mod character;
pub mod extractor;
