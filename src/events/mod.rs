//! Event identity, durable storage, and event-driven side effects.

pub mod notifier;
pub mod observer;
pub mod recorder;
pub mod store;

pub use notifier::PushNotifier;
pub use observer::{
    FallEvent, FallEventObserver, SuspectedEvent, SuspectedEventObserver, SuspectedOutcome,
};
pub use recorder::ClipRecorder;
pub use store::{EventStore, UploadStatus};
