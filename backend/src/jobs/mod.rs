// Background Jobs - periodic engine work (dispatch poller, stale sweep)

pub mod scheduler;

pub use scheduler::{JobConfig, JobScheduler};
