//! Request-processing core: schema inference, validation, serialization and graph operations.

mod graph;
mod inference;
mod transport;
mod validation;

pub use graph::{GraphService, PageQuery};
pub use inference::rules_for;
pub use transport::{related_to_transport_map, to_transport_map};
pub use validation::RequestValidator;
