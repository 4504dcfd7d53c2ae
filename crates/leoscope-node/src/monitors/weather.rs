//! Weather monitor (60 s cadence). No external weather API is in scope
//! here; this samples a slowly-varying synthetic series so
//! `weather.clear`/`weather.wind_mps` are present for trigger
//! expressions. A real deployment replaces the body of `sample` with a
//! call to the site's weather feed while keeping the same snapshot keys.

use leoscope_core::trigger::{Snapshot, Value};

pub fn sample(mut snapshot: Snapshot) -> Snapshot {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();

    let wind_mps = 4.0 + 3.0 * (now / 3600.0).sin();
    let clear = wind_mps < 6.0;

    snapshot.set("weather.wind_mps", Value::Number(wind_mps));
    snapshot.set("weather.clear", Value::Number(if clear { 1.0 } else { 0.0 }));
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_sets_wind_and_clear_keys() {
        let snap = sample(Snapshot::new());
        assert!(matches!(snap.get("weather.wind_mps"), Some(Value::Number(_))));
        assert!(matches!(snap.get("weather.clear"), Some(Value::Number(_))));
    }
}
