//! Vigil context builder
//!
//! Assembles the priority-ordered, size-bounded evidence packet an
//! investigation reasons over.
//!
//! - [`priority_order`] fixes which categories matter most per intent.
//! - [`compress`] summarizes large collections, event logs and time series.
//! - [`ContextPacket`] keeps a running token estimate and sheds items in
//!   reverse priority order when the budget is exceeded.
//! - [`ContextBuilder`] enforces the wall-clock deadline and degrades to a
//!   partial packet instead of blocking.
//! - [`ResourceCache`] absorbs the change feed and serves cached state.

pub mod builder;
pub mod cache;
pub mod compress;
pub mod error;
pub mod item;
pub mod packet;
pub mod source;

pub use builder::{ContextBuilder, ContextConfig};
pub use cache::{ApplyOutcome, CachedResource, ResourceCache};
pub use compress::CompressionLimits;
pub use error::{ContextError, ContextResult};
pub use item::{estimate_tokens, priority_order, ContextCategory, ContextItem};
pub use packet::{ContextPacket, DroppedItem};
pub use source::{ContextScope, ContextSource, RawContext};
