//! Policy queries.
//!
//! One query type per kind of policy object. A query is built from a policy
//! with `new` and narrowed with `with_*` setters, each of which validates its
//! input (resolving names, compiling patterns, checking permissions and
//! ranges) and fails early on bad criteria. `results()` then lazily walks the
//! policy's objects in declaration order, yielding those matching every
//! criterion set. Unset criteria match everything, so a fresh query returns
//! the whole collection.
//!
//! Queries only borrow the policy; any number may run against it at once.
//!
//! # Example
//!
//! ```ignore
//! use seflow::query::TeRuleQuery;
//! use seflow::policy::TeRuletype;
//!
//! let query = TeRuleQuery::new(&policy)
//!     .with_ruletypes([TeRuletype::Allow])
//!     .with_source("user_t")?
//!     .with_tclass(["file"])?
//!     .with_perms(["write"])?;
//!
//! for rule in query.results() {
//!     println!("{}", rule.display(&policy));
//! }
//! ```

pub mod criteria;
pub mod matching;

mod bounds;
mod bools;
mod classes;
mod constraint;
mod default;
mod mls;
mod mlsrule;
mod ocontext;
mod polcaps;
mod rbacrule;
mod roles;
mod terule;
mod types;
mod users;
mod xpermrule;

pub use bools::BoolQuery;
pub use bounds::BoundsQuery;
pub use classes::{CommonQuery, ObjClassQuery};
pub use constraint::ConstraintQuery;
pub use criteria::{ContextCriteria, ContextQuery};
pub use default::DefaultQuery;
pub use matching::{Criterion, LevelMatch, RangeMatch};
pub use mls::{CategoryQuery, SensitivityQuery};
pub use mlsrule::MlsRuleQuery;
pub use ocontext::{
    DevicetreeconQuery, FsUseQuery, GenfsconQuery, IbendportconQuery, IbpkeyconQuery,
    InitialSidQuery, IomemconQuery, IoportconQuery, NetifconQuery, NodeconQuery,
    PcideviceconQuery, PirqconQuery, PortconQuery,
};
pub use polcaps::PolcapQuery;
pub use rbacrule::RbacRuleQuery;
pub use roles::RoleQuery;
pub use terule::TeRuleQuery;
pub use types::{TypeAttributeQuery, TypeQuery};
pub use users::UserQuery;
pub use xpermrule::XpermRuleQuery;
