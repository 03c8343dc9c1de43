//! Hoist inference: turn observed workloads into a Unit proposal.
//!
//! Pipeline: [`signals::classify`] per workload, [`grouping`] into Units,
//! [`proposal`] for App Space metadata, then [`editor`] for operator edits.

#![forbid(unsafe_code)]

pub mod declared;
pub mod editor;
pub mod grouping;
pub mod proposal;
pub mod signals;

pub use declared::scan_repo;
pub use editor::ProposalEditor;
pub use grouping::{derive_slug, group_workloads, GroupingMode};
pub use proposal::{
    build_controller_proposal, build_proposal, dominant_deployer, infer_app_space, suggest_policy,
    DEFAULT_APP_SPACE,
};
pub use signals::{classify, extract_variant, normalize_variant, parse_namespace, Signals, Source};
