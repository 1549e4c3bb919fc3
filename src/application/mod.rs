//! Application layer: the components that turn a stream of ticks into
//! trigger decisions. Everything here is transport-agnostic - no module
//! in this tree touches a socket or a file directly; that is
//! `infrastructure`'s job.

pub mod alert_index;
pub mod bus;
pub mod cache;
pub mod candle_store;
pub mod engine;
pub mod indicators;
pub mod scheduler;
pub mod system;
pub mod throttle;
