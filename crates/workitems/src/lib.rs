//! `workitems` crate: the `WorkItem` trait and a recording test double.
//!
//! Every unit of work the engine dispatches, whatever actually performs it,
//! is driven through [`WorkItem`].  Implementations are supplied to the engine
//! by an integration as [`WorkItemFactory`] trait objects.

pub mod mock;
pub mod traits;

pub use traits::{Participant, WorkItem, WorkItemBinding, WorkItemFactory, WorkItemOutcome};
