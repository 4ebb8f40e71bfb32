pub mod cache;
pub mod config;
pub mod dispatch;
pub mod scope;

mod resolve;

pub use cache::{
    CacheEntry, CacheKind, CallSite, CallSiteDesc, CallSiteStats, CallType, ConstantCache,
    DescriptorError, RuntimeCache, SEPARATOR, SuperFrame, UnitDescriptor,
};
pub use config::DispatchConfig;
pub use dispatch::{
    CallPolicy, DispatchAction, DispatchHead, DispatchStats, Dispatched, MissingBehavior,
    NodeInfo, NodeKind,
};
pub use resolve::select_method_missing;
pub use scope::{
    DynamicScope, EvalType, ScopeChain, ScopeError, ScopeKind, ScopeLayout, StaticScope, VarRef,
};
