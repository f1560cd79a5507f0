//! HTTP handlers for resource verbs.

pub mod resource;
pub use resource::*;
