//! Core types - pure abstractions shared across the codebase.

mod driver;
mod state;
mod url;

pub use driver::BuildMode;
pub use state::Shutdown;
pub use url::ResourceUrl;
