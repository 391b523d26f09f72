//! Change-notification propagation over the declared association graph.
//!
//! This module provides:
//! - NotificationCalculator: decides whether a change notifies and computes the
//!   transitive set of dependents, guarding against cycles and diamonds
//! - EagerLoadPlanner: the association names a type needs loaded, memoized per event
//! - LifecycleHook: explicit save/destroy entry points that dispatch to consumers
//!
//! Host code owns persistence; it calls the hook after a save succeeds and
//! before a destroy runs.

mod calculator;
mod hook;
mod planner;

pub use calculator::*;
pub use hook::*;
pub use planner::*;
