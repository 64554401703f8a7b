//! Simulated transport-box sensors.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::config::TemperatureRange;

/// Nominal cold-chain temperature the simulation centres on, in °C
const BASE_TEMPERATURE_C: f64 = 4.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub temperature_c: f64,
    pub humidity_pct: u8,
    pub taken_at: DateTime<Utc>,
}

impl SensorReading {
    /// Temperature within ±1 °C of nominal, humidity 40-59 %.
    pub fn simulate<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> Self {
        let variation = (rng.gen::<f64>() - 0.5) * 2.0;
        let temperature_c = ((BASE_TEMPERATURE_C + variation) * 10.0).round() / 10.0;
        Self {
            temperature_c,
            humidity_pct: rng.gen_range(40..60),
            taken_at: now,
        }
    }

    /// Unknown sample kinds have no range and are never flagged.
    pub fn in_range(&self, range: Option<TemperatureRange>) -> bool {
        range.map_or(true, |r| r.contains(self.temperature_c))
    }

    pub fn temperature_display(&self) -> String {
        format!("{:.1}°C", self.temperature_c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_simulated_values_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let reading = SensorReading::simulate(&mut rng, Utc::now());
            assert!(reading.temperature_c >= 3.2 && reading.temperature_c <= 5.2);
            assert!((40..60).contains(&reading.humidity_pct));
        }
    }

    #[test]
    fn test_in_range() {
        let reading = SensorReading {
            temperature_c: 9.1,
            humidity_pct: 50,
            taken_at: Utc::now(),
        };
        assert!(!reading.in_range(Some(TemperatureRange { min: 2.0, max: 8.0 })));
        assert!(reading.in_range(Some(TemperatureRange { min: 0.0, max: 10.0 })));
        assert!(reading.in_range(None));
        assert_eq!(reading.temperature_display(), "9.1°C");
    }
}
