//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces the engine talks to but does not own.
//! Presentation layers plug in here.

mod progress;

pub use progress::{NoProgress, ProgressSink};
