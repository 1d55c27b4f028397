//! Configuration section definitions.
//!
//! | Section    | Purpose                                         |
//! |------------|-------------------------------------------------|
//! | `[build]`  | Source root, entry documents, watcher ignores   |
//! | `[serve]`  | Development server (interface, ports, watch)    |
//! | `[reload]` | Live update rooms and watcher timing            |

mod build;
mod reload;
mod serve;

pub use build::BuildConfig;
pub use reload::ReloadConfig;
pub use serve::ServeConfig;
