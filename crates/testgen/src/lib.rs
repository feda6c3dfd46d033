//! Store directories for tests, demos and benchmarks.
//!
//! [`fixture`] writes a consistent store from a logical graph,
//! [`generator`] produces random graphs, and [`sabotage`] breaks a written
//! store in one named way.

pub mod fixture;
pub mod generator;
pub mod sabotage;
