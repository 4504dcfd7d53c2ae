//! Local dispatchers for the node scheduler loop's admitted-job set
//! (§4.6 step 2/3): one poll-based dispatcher for CRON jobs, one
//! one-shot-timer dispatcher for ATQ jobs.

pub mod atq;
pub mod cron;
