//! Terminal telemetry monitor (1 s cadence): the node's own load, read
//! from `/proc/loadavg`. Unlike the satellite/weather monitors this one
//! has a real local data source.

use leoscope_core::trigger::{Snapshot, Value};

pub fn sample(mut snapshot: Snapshot) -> Snapshot {
    match read_load1() {
        Ok(load1) => snapshot.set("terminal.load1", Value::Number(load1)),
        Err(_) => {
            // Leave the previous value in place; the caller already
            // carries it forward via `snapshot`.
        }
    }
    snapshot
}

fn read_load1() -> Result<f64, anyhow::Error> {
    let contents = std::fs::read_to_string("/proc/loadavg")?;
    let first = contents
        .split_whitespace()
        .next()
        .ok_or_else(|| anyhow::anyhow!("empty /proc/loadavg"))?;
    Ok(first.parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_is_infallible_even_if_loadavg_is_unreadable() {
        let snap = sample(Snapshot::new());
        let _ = snap;
    }
}
