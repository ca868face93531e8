//! Queueing-theory wait estimation.

pub mod mm1;

pub use mm1::{WaitTimeEstimate, mm1_wait_time, service_rate_from_average};
