//! Simulated fire suppression for a tank with a heater and a water valve

use std::sync::Arc;
use std::time::Duration;

use modmaster::error::ProcessingError;
use modmaster::{ConfigItem, Configuration, DState, PointIdentifier, PointType, ProcessingManager};
use tokio_util::sync::CancellationToken;

pub(crate) const LEVEL: PointIdentifier = PointIdentifier::new(PointType::AnalogOutput, 1000);
pub(crate) const TEMPERATURE: PointIdentifier =
    PointIdentifier::new(PointType::AnalogOutput, 1001);
pub(crate) const VALVE: PointIdentifier = PointIdentifier::new(PointType::DigitalOutput, 2000);
pub(crate) const HEATER: PointIdentifier = PointIdentifier::new(PointType::DigitalOutput, 2002);

const DEFAULT_LEVEL: f64 = 650.0;
const DEFAULT_TEMPERATURE: f64 = 22.0;
const FIRE_TEMPERATURE: f64 = 57.0;
const RESET_TEMPERATURE: f64 = 40.0;
const MAX_WATER_PER_CYCLE: f64 = 10.0;
const REFILL_PER_CYCLE: f64 = 2.0;

/// What a single cycle decided
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) struct Cycle {
    /// temperature reached the fire threshold, the valve must open and the heater turn off
    pub(crate) fire_detected: bool,
    /// the tank cooled down and the fire was reset
    pub(crate) fire_cleared: bool,
}

/// Tank model advanced once per cycle from the current valve and heater states
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct Tank {
    pub(crate) level: f64,
    pub(crate) temperature: f64,
    pub(crate) fire: bool,
}

impl Tank {
    pub(crate) fn new(level: f64, temperature: f64) -> Self {
        Self {
            level,
            temperature,
            fire: false,
        }
    }

    pub(crate) fn step(&mut self, valve_open: bool, heater_on: bool, level_max: Option<f64>) -> Cycle {
        let mut cycle = Cycle::default();

        if heater_on && !self.fire {
            self.temperature += if self.temperature < 30.0 {
                2.0
            } else if self.temperature <= 50.0 {
                5.0
            } else {
                20.0
            };
        }

        if self.temperature >= FIRE_TEMPERATURE {
            self.fire = true;
            cycle.fire_detected = true;
        }

        if self.fire && self.temperature < RESET_TEMPERATURE {
            self.fire = false;
            cycle.fire_cleared = true;
        }

        if self.fire && valve_open && self.level > 0.0 {
            let water = self.level.min(MAX_WATER_PER_CYCLE);
            self.temperature -= water / 10.0 * 4.0;
            self.level -= water;
        }

        if !self.fire && valve_open {
            self.level += REFILL_PER_CYCLE;
            if let Some(max) = level_max {
                self.level = self.level.min(max);
            }
        }

        cycle
    }
}

/// Drives the tank model against the master's points
pub(crate) struct Automation {
    processing: Arc<ProcessingManager>,
    configuration: Arc<Configuration>,
    tank: Tank,
}

impl Automation {
    pub(crate) fn new(processing: Arc<ProcessingManager>, configuration: Arc<Configuration>) -> Self {
        let store = processing.store();
        let level = store
            .get(LEVEL)
            .map_or(DEFAULT_LEVEL, |p| f64::from(p.config().default_value));
        let temperature = store
            .get(TEMPERATURE)
            .map_or(DEFAULT_TEMPERATURE, |p| f64::from(p.config().default_value));
        Self {
            processing,
            configuration,
            tank: Tank::new(level, temperature),
        }
    }

    pub(crate) async fn run(mut self, period: Duration, cancel: CancellationToken) {
        self.write_digital(VALVE, false);
        self.write_digital(HEATER, false);

        loop {
            self.cycle();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
        }
        tracing::info!("automation stopped");
    }

    fn cycle(&mut self) {
        let store = self.processing.store();
        let is_on = |id| store.get(id).and_then(|p| p.state()) == Some(DState::On);
        let valve_open = is_on(VALVE);
        let heater_on = is_on(HEATER);
        let level_max = store.get(LEVEL).map(|p| p.config().egu_max);

        let cycle = self.tank.step(valve_open, heater_on, level_max);

        if cycle.fire_detected {
            self.write_digital(VALVE, true);
            self.write_digital(HEATER, false);
            tracing::warn!(
                "fire detected at {:.1}, suppression activated",
                self.tank.temperature
            );
        }
        if cycle.fire_cleared {
            tracing::info!("tank cooled down to {:.1}, fire reset", self.tank.temperature);
        }

        self.write_analog(TEMPERATURE, self.tank.temperature);
        self.write_analog(LEVEL, self.tank.level);
    }

    fn write_digital(&self, id: PointIdentifier, on: bool) {
        let result = self.item(id).and_then(|item| {
            self.processing.execute_write_command(
                &item,
                self.configuration.next_transaction_id(),
                self.configuration.unit_address(),
                id.address,
                i32::from(on),
            )
        });
        if let Err(err) = result {
            tracing::warn!("unable to write {}: {}", id, err);
        }
    }

    fn write_analog(&self, id: PointIdentifier, egu: f64) {
        let result = self.item(id).and_then(|item| {
            self.processing.write_analog_egu(
                &item,
                self.configuration.next_transaction_id(),
                self.configuration.unit_address(),
                id.address,
                egu,
            )
        });
        if let Err(err) = result {
            tracing::warn!("unable to write {}: {}", id, err);
        }
    }

    fn item(&self, id: PointIdentifier) -> Result<Arc<ConfigItem>, ProcessingError> {
        self.configuration
            .find(id)
            .cloned()
            .ok_or(ProcessingError::UnknownPoint(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heater_raises_the_temperature_in_steps() {
        let mut tank = Tank::new(100.0, 28.0);
        tank.step(false, true, None);
        assert_eq!(tank.temperature, 30.0);
        tank.step(false, true, None);
        assert_eq!(tank.temperature, 35.0);
        tank.temperature = 50.0;
        tank.step(false, true, None);
        assert_eq!(tank.temperature, 55.0);
        tank.step(false, true, None);
        assert_eq!(tank.temperature, 75.0);
        assert!(tank.fire);
    }

    #[test]
    fn fire_is_declared_at_the_threshold() {
        let mut tank = Tank::new(100.0, 57.0);
        let cycle = tank.step(false, false, None);
        assert_eq!(
            cycle,
            Cycle {
                fire_detected: true,
                fire_cleared: false
            }
        );
        // the heater has no effect during a fire
        tank.step(false, true, None);
        assert_eq!(tank.temperature, 57.0);
    }

    #[test]
    fn open_valve_cools_a_fire_with_water() {
        let mut tank = Tank::new(15.0, 60.0);
        tank.fire = true;
        tank.step(true, false, None);
        assert_eq!(tank.level, 5.0);
        assert_eq!(tank.temperature, 56.0);
        // less than a full cycle of water left
        tank.step(true, false, None);
        assert_eq!(tank.level, 0.0);
        assert_eq!(tank.temperature, 54.0);
        // an empty tank no longer cools
        tank.step(true, false, None);
        assert_eq!(tank.temperature, 54.0);
    }

    #[test]
    fn fire_resets_below_the_reset_temperature() {
        let mut tank = Tank::new(100.0, 42.0);
        tank.fire = true;
        let cycle = tank.step(true, false, None);
        assert!(!cycle.fire_cleared);
        assert_eq!(tank.temperature, 38.0);
        let cycle = tank.step(true, false, None);
        assert!(cycle.fire_cleared);
        assert!(!tank.fire);
        // refilling starts in the same cycle
        assert_eq!(tank.level, 92.0);
    }

    #[test]
    fn open_valve_refills_up_to_the_maximum() {
        let mut tank = Tank::new(99.0, 20.0);
        tank.step(true, false, Some(100.0));
        assert_eq!(tank.level, 100.0);
        tank.step(true, false, Some(100.0));
        assert_eq!(tank.level, 100.0);
        tank.step(false, false, Some(100.0));
        assert_eq!(tank.level, 100.0);
    }
}
