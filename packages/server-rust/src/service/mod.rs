//! Service layer: the service model, its middleware pipeline, the per-call
//! dispatcher, and the drain machinery for trigger-driven services.

pub mod descriptor;
pub mod dispatcher;
pub mod drain;
pub mod middleware;
pub mod worker;

pub use descriptor::{CallScope, Service, ServiceDescriptor};
pub use dispatcher::{CallDispatcher, MIDDLEWARE_FAILURE_MESSAGE};
pub use drain::{DrainController, DrainState};
pub use middleware::{ContextPatch, Middleware};
pub use worker::{BackgroundRunnable, BackgroundWorker};
