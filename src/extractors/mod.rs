mod format;
mod path;

pub use format::{Format, ACCEPT_HEADER};
pub use path::PathParams;
