//! Query routing
//!
//! classify → resolve → invoke → normalize, one query at a time. Nothing in
//! this module returns an error to its caller; every stage degrades to a
//! defined fallback value.

mod category;
pub mod classifier;
pub mod extract;
pub mod invoker;
pub mod registry;
mod router;

pub use category::{Category, Presentation};
pub use classifier::{Classification, ClassificationSource, Classifier};
pub use extract::{extract_category, extract_routing_decision};
pub use invoker::{HandlerBackend, HandlerInputs, HandlerInvoker, HttpHandlerBackend};
pub use registry::{HandlerDescriptor, HandlerKind, HandlerRegistry};
pub use router::{BLANK_QUERY_RESPONSE, RouteOutcome, Router, StreamEvent};
