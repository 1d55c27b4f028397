//! Actor System for Live Updates
//!
//! Message-passing concurrency for serve mode:
//!
//! ```text
//! FsActor --ReloadMsg--> ReloadActor --LiveEvent--> rooms --> subscribers
//! (watch)                (re-cook + decide)
//! ```
//!
//! # Module Structure
//!
//! - `messages` - Message types for inter-actor communication
//! - `fs` - File system watcher with debouncing
//! - `reload` - Turns file changes into live update events
//! - `coordinator` - Wires up and runs actors

pub mod coordinator;
pub mod fs;
pub mod messages;
pub mod reload;

pub use coordinator::Coordinator;
