//! Local one-shot dispatch bookkeeping for ATQ jobs. Unlike CRON, an ATQ
//! firing is scheduled well ahead of time via a real `tokio::time::
//! sleep_until` timer armed the first tick the job is seen; only a job
//! whose `start_ts` has already elapsed by the time it is first seen
//! (e.g. newly admitted, or the node was down) falls back to asking the
//! coordinator for the nearest free slot instead of firing stale.

use std::collections::HashMap;

use tokio::task::JoinHandle;

#[derive(Debug, PartialEq, Eq)]
pub enum AtqAction {
    /// Already armed, already fired, or already has a run — nothing to
    /// do this tick.
    NoOp,
    /// `start_ts` already elapsed and no run exists for it; the caller
    /// must call `reschedule_job_nearest`.
    Reschedule,
    /// A fresh one-shot timer was armed for `start_ts`.
    Armed,
}

#[derive(Default)]
pub struct AtqDispatcher {
    armed: HashMap<String, JoinHandle<()>>,
}

impl AtqDispatcher {
    /// Decides what to do with one ATQ job this tick. `spawn_fire` is
    /// called to arm the timer when, and only when, this returns
    /// `Armed`; the dispatcher does not know how to launch the executor
    /// itself.
    pub fn note_job(
        &mut self,
        job_id: &str,
        start_ts: i64,
        now_ts: i64,
        run_exists: bool,
        spawn_fire: impl FnOnce() -> JoinHandle<()>,
    ) -> AtqAction {
        if self.armed.contains_key(job_id) {
            return AtqAction::NoOp;
        }
        if start_ts <= now_ts {
            return if run_exists {
                AtqAction::NoOp
            } else {
                AtqAction::Reschedule
            };
        }
        self.armed.insert(job_id.to_string(), spawn_fire());
        AtqAction::Armed
    }

    /// Drops bookkeeping for jobs no longer admitted on this node,
    /// aborting any still-pending timer.
    pub fn prune(&mut self, present: &std::collections::HashSet<String>) {
        let stale: Vec<String> = self
            .armed
            .keys()
            .filter(|id| !present.contains(id.as_str()))
            .cloned()
            .collect();
        for id in stale {
            if let Some(handle) = self.armed.remove(&id) {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn noop_handle() -> JoinHandle<()> {
        tokio::spawn(async {})
    }

    #[tokio::test]
    async fn future_start_is_armed_exactly_once() {
        let mut d = AtqDispatcher::default();
        let action = d.note_job("j1", 100, 50, false, noop_handle);
        assert_eq!(action, AtqAction::Armed);

        let action = d.note_job("j1", 100, 51, false, noop_handle);
        assert_eq!(action, AtqAction::NoOp);
    }

    #[tokio::test]
    async fn past_start_without_run_requests_reschedule() {
        let mut d = AtqDispatcher::default();
        let action = d.note_job("j1", 40, 50, false, noop_handle);
        assert_eq!(action, AtqAction::Reschedule);
    }

    #[tokio::test]
    async fn past_start_with_existing_run_is_a_noop() {
        let mut d = AtqDispatcher::default();
        let action = d.note_job("j1", 40, 50, true, noop_handle);
        assert_eq!(action, AtqAction::NoOp);
    }

    #[tokio::test]
    async fn prune_aborts_timers_for_jobs_no_longer_present() {
        let mut d = AtqDispatcher::default();
        d.note_job("j1", 100, 50, false, noop_handle);
        assert!(d.armed.contains_key("j1"));

        d.prune(&HashSet::new());
        assert!(d.armed.is_empty());
    }
}
