//! Local recurring-time dispatcher for CRON jobs. Refreshed every
//! scheduler tick: registers a schedule per admitted CRON job,
//! deduplicated by `(job_id, cron_expr)`, and reports which job ids have
//! a firing inside the tick window so the caller can spawn the
//! executor. Mirrors the teacher's per-tick poll-and-diff cron checking
//! rather than one long-lived timer task per job — CRON firings are
//! always ahead of the tick that notices them, so poll granularity at
//! the loop period is sufficient.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use cron::Schedule;

struct Entry {
    expr: String,
    schedule: Schedule,
}

#[derive(Default)]
pub struct CronDispatcher {
    entries: HashMap<String, Entry>,
}

impl CronDispatcher {
    /// Registers or refreshes one entry per `(job_id, cron_expr)` and
    /// drops entries whose job id is no longer present. Returns job ids
    /// whose expression failed to parse (admission should already have
    /// rejected these; this is a defence-in-depth path only).
    pub fn sync<'a>(&mut self, cron_jobs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut rejected = Vec::new();
        for (job_id, expr) in cron_jobs {
            seen.insert(job_id.to_string());
            let stale = match self.entries.get(job_id) {
                Some(e) => e.expr != expr,
                None => true,
            };
            if stale {
                match leoscope_core::schedule::parse_cron(expr) {
                    Ok(schedule) => {
                        self.entries.insert(
                            job_id.to_string(),
                            Entry {
                                expr: expr.to_string(),
                                schedule,
                            },
                        );
                    }
                    Err(_) => rejected.push(job_id.to_string()),
                }
            }
        }
        self.entries.retain(|id, _| seen.contains(id));
        rejected
    }

    /// Job ids with a firing in the half-open tick window `[since, now)`.
    pub fn due(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> Vec<String> {
        let probe = since - chrono::Duration::seconds(1);
        self.entries
            .iter()
            .filter_map(|(id, e)| {
                e.schedule
                    .after(&probe)
                    .next()
                    .filter(|t| *t >= since && *t < now)
                    .map(|_| id.clone())
            })
            .collect()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_drops_entries_for_jobs_no_longer_present() {
        let mut d = CronDispatcher::default();
        d.sync([("a", "*/5 * * * *"), ("b", "*/5 * * * *")]);
        assert_eq!(d.len(), 2);
        d.sync([("a", "*/5 * * * *")]);
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn sync_reports_unparseable_expressions() {
        let mut d = CronDispatcher::default();
        let rejected = d.sync([("a", "not a cron expr")]);
        assert_eq!(rejected, vec!["a".to_string()]);
        assert_eq!(d.len(), 0);
    }

    #[test]
    fn due_finds_a_firing_inside_the_tick_window() {
        let mut d = CronDispatcher::default();
        d.sync([("a", "* * * * *")]);

        let since = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let now = since + chrono::Duration::minutes(1);
        assert_eq!(d.due(since, now), vec!["a".to_string()]);
    }
}
