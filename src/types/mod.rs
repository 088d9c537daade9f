//! Core data types for CMS risk adjustment scoring

// Module declarations
mod demographics;
mod model;
mod result;
mod service;

// Re-export all types for convenient access
pub use demographics::*;
pub use model::*;
pub use result::*;
pub use service::*;
