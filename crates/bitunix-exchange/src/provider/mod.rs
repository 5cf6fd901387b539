//! `ExecutionGateway` 구현체.

pub mod live;
pub mod paper;
pub mod simulated;
