//! SELinux policy analysis.
//!
//! This crate queries an in-memory policy and runs the two graph analyses
//! built on it: information flow between types, weighted by a permission
//! map, and domain transitions between process types. Two policies can
//! also be compared with [`PolicyDifference`].

pub mod checker;
pub mod config;
pub mod diff;
pub mod dta;
pub mod error;
pub mod graph;
pub mod infoflow;
pub mod permmap;
pub mod policy;
pub mod query;

pub use checker::{create_check, CheckConfig, CheckerModule, Finding};
pub use config::AnalysisConfig;
pub use diff::PolicyDifference;
pub use dta::{DomainEntrypoint, DomainTransition, DomainTransitionAnalysis, TransitionPath};
pub use error::{PolicyError, Result};
pub use infoflow::{GraphStats, InfoFlowAnalysis, InfoFlowPath, InfoFlowStep};
pub use permmap::{FlowDirection, Mapping, PermissionMap, RuleWeight};
pub use policy::{Policy, PolicyBuilder, PolicyDisplay};
