//! Destination routing: the ordered rule engine and the deadline-bounded
//! regex evaluator it depends on.

pub mod bounded;
pub mod engine;
