//! Rolling average-speed series for the live speed chart.

use std::collections::VecDeque;

use crate::registry::LiveEntity;

/// Default window: one minute of one-second ticks.
pub const DEFAULT_WINDOW: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSample {
    /// Telemetry tick index since the session started.
    pub tick: u64,
    /// Mean speed in km/h.
    pub speed: f64,
}

#[derive(Debug, Clone)]
pub struct SpeedSeries {
    samples: VecDeque<SpeedSample>,
    capacity: usize,
    next_tick: u64,
}

impl Default for SpeedSeries {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_WINDOW)
    }
}

impl SpeedSeries {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            next_tick: 0,
        }
    }

    /// Mean of the entities' reported speeds. Entities without a speed are
    /// skipped; no samples gives 0.
    pub fn mean_speed<'a>(entities: impl IntoIterator<Item = &'a LiveEntity>) -> f64 {
        let (sum, n) = entities
            .into_iter()
            .filter_map(|e| e.speed)
            .filter(|s| s.is_finite())
            .fold((0.0, 0usize), |(sum, n), s| (sum + s, n + 1));
        if n == 0 {
            0.0
        } else {
            sum / n as f64
        }
    }

    /// Append one tick's average, evicting the oldest sample when full.
    pub fn record(&mut self, speed: f64) -> SpeedSample {
        let sample = SpeedSample {
            tick: self.next_tick,
            speed,
        };
        self.next_tick += 1;
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        sample
    }

    /// Latest average, 0 before the first tick.
    pub fn current(&self) -> f64 {
        self.samples.back().map_or(0.0, |s| s.speed)
    }

    pub fn samples(&self) -> impl Iterator<Item = &SpeedSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.next_tick = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityClass, LatLng};

    fn entity(speed: Option<f64>) -> LiveEntity {
        LiveEntity {
            id: "e".into(),
            position: LatLng::new(0.0, 0.0),
            heading: None,
            class: EntityClass::Passenger,
            kind: "passenger".into(),
            speed,
        }
    }

    #[test]
    fn mean_skips_missing_speeds() {
        let es = [entity(Some(10.0)), entity(None), entity(Some(30.0))];
        assert_eq!(SpeedSeries::mean_speed(&es), 20.0);
        assert_eq!(SpeedSeries::mean_speed(&[] as &[LiveEntity]), 0.0);
    }

    #[test]
    fn window_evicts_oldest() {
        let mut s = SpeedSeries::with_capacity(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            s.record(v);
        }
        let ticks: Vec<u64> = s.samples().map(|x| x.tick).collect();
        assert_eq!(ticks, vec![1, 2, 3]);
        assert_eq!(s.current(), 4.0);
    }

    #[test]
    fn clear_resets_ticks() {
        let mut s = SpeedSeries::default();
        s.record(5.0);
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.current(), 0.0);
        assert_eq!(s.record(1.0).tick, 0);
    }
}
