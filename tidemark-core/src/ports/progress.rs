//! Progress port - where the engine announces each migration it starts

use std::sync::mpsc::{Sender, SyncSender};

/// Receiver of "now starting <filename>" notifications
///
/// Engine operations take the sink by value and drop it when they return,
/// so channel-backed sinks are closed at the end of every batch.
pub trait ProgressSink {
    /// Called right before a migration starts
    fn started(&mut self, filename: &str);
}

/// Rendezvous or bounded channel; blocks until the consumer takes the name
impl ProgressSink for SyncSender<String> {
    fn started(&mut self, filename: &str) {
        if self.send(filename.to_string()).is_err() {
            log::debug!("progress receiver gone, dropping notification for {}", filename);
        }
    }
}

impl ProgressSink for Sender<String> {
    fn started(&mut self, filename: &str) {
        if self.send(filename.to_string()).is_err() {
            log::debug!("progress receiver gone, dropping notification for {}", filename);
        }
    }
}

/// Collects filenames in memory
impl ProgressSink for Vec<String> {
    fn started(&mut self, filename: &str) {
        self.push(filename.to_string());
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for &mut S {
    fn started(&mut self, filename: &str) {
        (**self).started(filename);
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn started(&mut self, _filename: &str) {}
}
