//! # flowkeep-sync
//!
//! Reconciliation engine: fetch each instance's flows, diff them against the
//! recorded state, materialize the result as files, and commit it.
//!
//! Call [`pipeline::run`] for a full pass against live instances,
//! [`pipeline::run_sweep`] to supply the collaborators, or [`reconcile::reconcile`]
//! to reconcile a single instance against an explicit state.

pub mod commit_store;
pub mod diff;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod pipeline;
pub mod reconcile;
pub mod state_store;
pub mod writer;

pub use commit_store::{CommitStore, GitCli, PushFailure, PushOutcome};
pub use diff::{diff_instance, DiffInstanceResult, FileDiff};
pub use error::{FetchError, SyncError};
pub use fetch::{FlowSource, HttpFlowSource};
pub use pipeline::{
    run_sweep, InstanceOutcome, InstanceReport, SweepContext, SweepOptions, SweepReport,
};
pub use reconcile::{reconcile, Reconciliation};
pub use state_store::{FileStateStore, FlowState, RecordedFlow, StateStore};
pub use writer::{ArchiveResult, WriteResult};
