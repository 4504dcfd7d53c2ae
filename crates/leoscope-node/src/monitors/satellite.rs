//! Satellite elevation monitor (1-5 s cadence). No ephemeris/TLE source
//! is wired in yet, so elevation is derived from a deterministic
//! periodic model of the pass geometry seeded by the node's own
//! coordinates — stable enough for trigger expressions like
//! `sat.elevation_deg > 20` to exercise real state changes in tests
//! without a live feed. Swap in a real SGP4 propagator behind this same
//! `sample` signature when one is available.

use leoscope_core::model::Coords;
use leoscope_core::trigger::{Snapshot, Value};

const PASS_PERIOD_SECS: f64 = 90.0 * 60.0;

pub fn sample(coords: Coords, mut snapshot: Snapshot) -> Snapshot {
    let now = wall_clock_secs();
    let phase = (now / PASS_PERIOD_SECS + coords.lat / 360.0).fract() * std::f64::consts::TAU;
    let elevation_deg = 90.0 * phase.sin().max(0.0);

    snapshot.set("sat.elevation_deg", Value::Number(elevation_deg));
    snapshot.set("sat.visible", Value::Number(if elevation_deg > 0.0 { 1.0 } else { 0.0 }));
    snapshot
}

fn wall_clock_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_always_sets_elevation_and_visibility() {
        let snap = sample(Coords { lat: 51.5, lon: 0.0 }, Snapshot::new());
        assert!(matches!(snap.get("sat.elevation_deg"), Some(Value::Number(_))));
        assert!(matches!(snap.get("sat.visible"), Some(Value::Number(_))));
    }
}
