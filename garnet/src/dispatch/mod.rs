//! Self-specializing dispatch chains: each call site grows a short list of
//! receiver-specific nodes in front of an `Unresolved` tail, and falls back
//! to a single `Uncached` node once it has seen too many receiver types.

mod head;
mod node;

pub use head::{DispatchAction, DispatchHead, DispatchStats, Dispatched, MissingBehavior, NodeInfo};
pub use node::{CallPolicy, NodeKind};
