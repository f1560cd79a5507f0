pub mod types;
pub mod schema;
pub mod descriptor;
pub mod resolver;

pub use types::*;
pub use schema::*;
pub use descriptor::*;
pub use resolver::*;
