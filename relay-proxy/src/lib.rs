pub mod cache;
pub mod dispatcher;
pub mod node_api;
pub mod normalize;
pub mod ops;
pub mod policy;
pub mod response;

pub use dispatcher::{AttemptError, AttemptOutcome, DispatchAttempt, DispatchResult, Dispatcher};
pub use normalize::{ContainerStats, FileInfo, FileKind};
pub use ops::Operations;
pub use policy::{Backoff, PositionPolicy, RetryPolicy};
