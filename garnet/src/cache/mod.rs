//! Per-call-site caches for the interpreter: method entries, constants,
//! instance-variable accessors and literals, allocated per compiled unit.

mod call_site;
mod constant;
mod descriptor;
mod entry;
mod runtime_cache;

pub use call_site::{CallSite, CallSiteStats, SuperFrame};
pub use constant::ConstantCache;
pub use descriptor::{CacheKind, CallSiteDesc, CallType, DescriptorError, SEPARATOR, UnitDescriptor};
pub use entry::CacheEntry;
pub use runtime_cache::RuntimeCache;
