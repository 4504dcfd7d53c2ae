//! Schedule algebra. Enumerates the firing instants of a cron or atq
//! job inside its validity window and detects pairwise occupancy
//! overlap. Pure and synchronous — no I/O, so fully unit-testable
//! without a runtime.

use std::str::FromStr;

use cron::Schedule as CronSchedule;

use crate::model::{Job, JobSchedule, Validity};

/// A half-open occupancy interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    pub fn new(start: i64, length_secs: u64) -> Self {
        Self {
            start,
            end: start + length_secs as i64,
        }
    }

    /// Half-open overlap: `a.start < b.end && b.start < a.end`. Touching
    /// intervals (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// `cron` requires a seconds field; the spec's cron expressions are the
/// usual 5-field unix form. Reject 6-field expressions with a nonzero
/// seconds field rather than silently truncating to the minute.
fn normalize_cron(expr: &str) -> Result<String, anyhow::Error> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    match parts.len() {
        5 => Ok(format!("0 {}", parts.join(" "))),
        6 => {
            if parts[0] != "0" {
                anyhow::bail!("cron seconds field must be 0 for minute-granularity scheduling");
            }
            Ok(parts.join(" "))
        }
        _ => Err(anyhow::anyhow!(
            "invalid cron expression: expected 5 fields, got {}",
            parts.len()
        )),
    }
}

pub fn parse_cron(expr: &str) -> Result<CronSchedule, anyhow::Error> {
    let normalized = normalize_cron(expr)?;
    Ok(CronSchedule::from_str(&normalized)?)
}

fn validity_intersection(a: Validity, b: Validity) -> Option<Validity> {
    let start_ts = a.start_ts.max(b.start_ts);
    let end_ts = a.end_ts.min(b.end_ts);
    if start_ts < end_ts {
        Some(Validity { start_ts, end_ts })
    } else {
        None
    }
}

/// Enumerate every firing instant of `job` whose occupancy
/// `[t, t+length_secs)` fits entirely inside `window`. CRON is
/// enumerated by walking forward; ATQ is a single firing. Finite
/// because `window` is bounded.
pub fn firings_within(job: &Job, window: Validity) -> Result<Vec<i64>, anyhow::Error> {
    let Some(window) = validity_intersection(window, job.validity) else {
        return Ok(Vec::new());
    };

    match &job.schedule {
        JobSchedule::Atq { at_ts } => {
            if *at_ts >= window.start_ts && at_ts + job.length_secs as i64 <= window.end_ts {
                Ok(vec![*at_ts])
            } else {
                Ok(Vec::new())
            }
        }
        JobSchedule::Cron { expr } => {
            let schedule = parse_cron(expr)?;
            let start = chrono::DateTime::from_timestamp(window.start_ts, 0)
                .ok_or_else(|| anyhow::anyhow!("invalid window start"))?;
            // `after` is exclusive; step back one second to include a
            // firing that lands exactly on the window start.
            let probe = start - chrono::Duration::seconds(1);
            let mut out = Vec::new();
            for candidate in schedule.after(&probe) {
                let t = candidate.timestamp();
                if t < window.start_ts {
                    continue;
                }
                if t + job.length_secs as i64 > window.end_ts {
                    break;
                }
                out.push(t);
            }
            Ok(out)
        }
    }
}

/// `occ(job)` as a set of half-open intervals within the job's own
/// validity window.
pub fn occupancy(job: &Job) -> Result<Vec<Interval>, anyhow::Error> {
    let firings = firings_within(job, job.validity)?;
    Ok(firings
        .into_iter()
        .map(|t| Interval::new(t, job.length_secs))
        .collect())
}

/// First overlapping pair of firings between `a` and `b`, if any. The two
/// jobs' validity windows must intersect or neither can possibly overlap
/// — that is a cheap early skip — but the actual enumeration walks each
/// job's *own* full occupancy set, since an occupancy can start before
/// the intersection and still intrude into it (e.g. a firing just shy of
/// the intersection's left edge whose length carries it across that
/// edge). Both sequences are finite because both validity windows are
/// finite. Returns the offending job's firing instant on success.
pub fn first_overlap(a: &Job, b: &Job) -> Result<Option<(i64, i64)>, anyhow::Error> {
    if validity_intersection(a.validity, b.validity).is_none() {
        return Ok(None);
    }

    let a_occ = occupancy(a)?;
    if a_occ.is_empty() {
        return Ok(None);
    }
    let b_occ = occupancy(b)?;
    if b_occ.is_empty() {
        return Ok(None);
    }

    for a_int in &a_occ {
        for b_int in &b_occ {
            if a_int.overlaps(b_int) {
                return Ok(Some((a_int.start, b_int.start)));
            }
        }
    }
    Ok(None)
}

/// The admission algorithm. `existing` must already be filtered to
/// admitted overhead jobs touching `candidate`'s node set — the caller
/// (coordinator admission critical section) owns that query and the
/// per-node serialization guarantee; this function is the pure check.
pub fn check_admission<'a>(
    candidate: &Job,
    existing: impl IntoIterator<Item = &'a Job>,
) -> Result<(), crate::error::LeoError> {
    if !candidate.overhead {
        return Ok(());
    }

    for other in existing {
        match first_overlap(candidate, other) {
            Ok(Some((_candidate_instant, other_instant))) => {
                return Err(crate::error::LeoError::conflict(
                    format!("overlaps admitted job {}", other.id),
                    &other.id,
                    other_instant,
                ));
            }
            Ok(None) => {}
            Err(e) => return Err(crate::error::LeoError::invalid(e.to_string())),
        }
    }
    Ok(())
}

/// `reschedule_job_nearest`: the earliest `t >= after` inside the job's
/// original validity such that shifting the job's single occupancy to
/// `[t, t+length_secs)` conflicts with none of `existing`. ATQ only;
/// callers must reject CRON jobs with `UNSUPPORTED` before calling this.
pub fn reschedule_nearest<'a>(
    job: &Job,
    after: i64,
    existing: impl IntoIterator<Item = &'a Job> + Clone,
) -> Option<i64> {
    let JobSchedule::Atq { .. } = &job.schedule else {
        return None;
    };

    let mut t = after.max(job.validity.start_ts);
    while t + job.length_secs as i64 <= job.validity.end_ts {
        let candidate_interval = Interval::new(t, job.length_secs);
        let mut conflict_end: Option<i64> = None;

        for other in existing.clone() {
            if let Ok(occ) = occupancy(other) {
                for interval in occ {
                    if candidate_interval.overlaps(&interval) {
                        conflict_end = Some(match conflict_end {
                            Some(cur) => cur.max(interval.end),
                            None => interval.end,
                        });
                    }
                }
            }
        }

        match conflict_end {
            None => return Some(t),
            Some(end) => t = end,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobParams, JobSchedule};

    fn cron_job(id: &str, node_id: &str, expr: &str, start: i64, end: i64, length: u64) -> Job {
        Job {
            id: id.into(),
            node_id: node_id.into(),
            owner_id: "u".into(),
            schedule: JobSchedule::Cron { expr: expr.into() },
            validity: Validity {
                start_ts: start,
                end_ts: end,
            },
            length_secs: length,
            overhead: true,
            paired_server_node_id: None,
            trigger: None,
            config: String::new(),
            params: JobParams::default(),
        }
    }

    fn atq_job(id: &str, node_id: &str, at_ts: i64, end: i64, length: u64) -> Job {
        Job {
            id: id.into(),
            node_id: node_id.into(),
            owner_id: "u".into(),
            schedule: JobSchedule::Atq { at_ts },
            validity: Validity {
                start_ts: at_ts,
                end_ts: end,
            },
            length_secs: length,
            overhead: true,
            paired_server_node_id: None,
            trigger: None,
            config: String::new(),
            params: JobParams::default(),
        }
    }

    const DAY0: i64 = 1_704_067_200; // 2024-01-01T00:00:00Z

    #[test]
    fn interval_half_open_touching_does_not_overlap() {
        let a = Interval::new(DAY0 + 600, 300); // [00:10, 00:15)
        let b = Interval::new(DAY0 + 900, 60); // [00:15, 00:16)
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn admit_recurring_then_reject_overlap_then_admit_touching() {
        let a = cron_job("A", "n1", "*/10 * * * *", DAY0, DAY0 + 3600, 300);

        // Scenario 2: B overlaps A's 00:10 firing.
        let b = atq_job("B", "n1", DAY0 + 720, DAY0 + 1200, 300);
        let err = check_admission(&b, [&a]).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Conflict);
        assert_eq!(err.details.unwrap()["offending_job_id"], "A");

        // Scenario 3: B2 touches A's occupancy boundary exactly, admitted.
        let b2 = atq_job("B2", "n1", DAY0 + 900, DAY0 + 1200, 60);
        assert!(check_admission(&b2, [&a]).is_ok());
    }

    #[test]
    fn cron_firing_before_validity_start_is_skipped() {
        // Schedule fires at minute 0, 10, 20... validity starts at :05,
        // so the first counted firing is :10.
        let job = cron_job("A", "n1", "*/10 * * * *", DAY0 + 300, DAY0 + 3600, 60);
        let occ = occupancy(&job).unwrap();
        assert_eq!(occ[0].start, DAY0 + 600);
    }

    #[test]
    fn cron_firing_exceeding_validity_end_is_not_counted() {
        // Validity ends at :15; the :10 firing with length 600s would end
        // at :20, past validity.end, so it's excluded — only :00 fits.
        let job = cron_job("A", "n1", "*/10 * * * *", DAY0, DAY0 + 900, 600);
        let occ = occupancy(&job).unwrap();
        assert!(occ.iter().all(|i| i.end <= DAY0 + 900));
        assert_eq!(occ.len(), 1); // only the :00 firing fits
    }

    #[test]
    fn non_overhead_candidate_is_admitted_unconditionally() {
        let mut b = atq_job("B", "n1", DAY0 + 0, DAY0 + 3600, 3600);
        b.overhead = false;
        let a = cron_job("A", "n1", "*/10 * * * *", DAY0, DAY0 + 3600, 300);
        assert!(check_admission(&b, [&a]).is_ok());
    }

    #[test]
    fn reschedule_nearest_finds_next_free_slot() {
        let a = cron_job("A", "n1", "*/10 * * * *", DAY0, DAY0 + 3600, 300);
        let b = atq_job("B", "n1", DAY0 + 720, DAY0 + 3600, 300);

        let t = reschedule_nearest(&b, DAY0 + 900, [&a]).expect("slot");
        assert_eq!(t, DAY0 + 900);
    }

    #[test]
    fn reschedule_nearest_returns_none_when_validity_exhausted() {
        let a = cron_job("A", "n1", "* * * * *", DAY0, DAY0 + 120, 60);
        let b = atq_job("B", "n1", DAY0, DAY0 + 120, 60);
        assert!(reschedule_nearest(&b, DAY0, [&a]).is_none());
    }
}
