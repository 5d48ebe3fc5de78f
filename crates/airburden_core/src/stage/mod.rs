//! Pipeline stages: deduplicate, merge sources, join burden data.
//!
//! # Stage contract
//! - Each stage takes the store connection as an explicit `&mut Connection`
//!   and commits all of its writes as one transaction before returning.
//! - Stages that produce a derived table fully replace it (drop, recreate,
//!   fill). Re-running a stage on any prior state converges to the same
//!   output.
//! - Per-row problems are logged and counted in the stage report; only store
//!   failures abort a stage.

pub mod dedup;
pub mod join;
pub mod merge;
