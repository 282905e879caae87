use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::alarm::{analog_alarm, digital_alarm, AlarmType};
use crate::config::ConfigItem;
use crate::egu::{clamp_egu, convert_to_egu};
use crate::types::PointIdentifier;

/// State of a digital point
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum DState {
    /// 0
    #[default]
    Off,
    /// 1
    On,
}

impl DState {
    /// any non-zero raw value is ON
    pub fn from_raw(raw: u16) -> Self {
        if raw == 0 {
            DState::Off
        } else {
            DState::On
        }
    }
}

impl std::fmt::Display for DState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DState::Off => f.write_str("OFF"),
            DState::On => f.write_str("ON"),
        }
    }
}

/// Current value of a point
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PointValue {
    /// coils and discrete inputs
    Digital {
        /// decoded state
        state: DState,
        /// last raw value
        raw: u16,
    },
    /// registers
    Analog {
        /// value in engineering units, within `[EGU_Min, EGU_Max]`
        egu: f64,
        /// last raw value
        raw: u16,
    },
}

impl PointValue {
    /// the raw value regardless of the variant
    pub fn raw(&self) -> u16 {
        match self {
            PointValue::Digital { raw, .. } | PointValue::Analog { raw, .. } => *raw,
        }
    }
}

/// Runtime state of a single point
#[derive(Clone, Debug)]
pub struct Point {
    id: PointIdentifier,
    value: PointValue,
    timestamp: Option<DateTime<Local>>,
    alarm: AlarmType,
    config: Arc<ConfigItem>,
}

impl Point {
    /// Create a point at `address` from the block it belongs to
    ///
    /// The point takes its type from the block, so the two can never disagree
    pub(crate) fn new(config: Arc<ConfigItem>, address: u16) -> Self {
        let point_type = config.registry_type;
        let value = if point_type.is_digital() {
            PointValue::Digital {
                state: DState::Off,
                raw: 0,
            }
        } else {
            PointValue::Analog { egu: 0.0, raw: 0 }
        };
        Self {
            id: PointIdentifier::new(point_type, address),
            value,
            timestamp: None,
            alarm: AlarmType::NoAlarm,
            config,
        }
    }

    /// identifier of the point
    pub fn id(&self) -> PointIdentifier {
        self.id
    }

    /// current value
    pub fn value(&self) -> PointValue {
        self.value
    }

    /// current raw value
    pub fn raw(&self) -> u16 {
        self.value.raw()
    }

    /// engineering value of an analog point
    pub fn egu(&self) -> Option<f64> {
        match self.value {
            PointValue::Analog { egu, .. } => Some(egu),
            PointValue::Digital { .. } => None,
        }
    }

    /// state of a digital point
    pub fn state(&self) -> Option<DState> {
        match self.value {
            PointValue::Digital { state, .. } => Some(state),
            PointValue::Analog { .. } => None,
        }
    }

    /// time of the last update, `None` until the first one
    pub fn timestamp(&self) -> Option<DateTime<Local>> {
        self.timestamp
    }

    /// current alarm
    pub fn alarm(&self) -> AlarmType {
        self.alarm
    }

    /// configuration of the block the point belongs to
    pub fn config(&self) -> &Arc<ConfigItem> {
        &self.config
    }

    /// Apply a raw value: digital state or clamped EGU value, alarm and timestamp together
    pub(crate) fn apply_raw(&mut self, raw: u16, now: DateTime<Local>) {
        match self.value {
            PointValue::Digital { .. } => {
                self.value = PointValue::Digital {
                    state: DState::from_raw(raw),
                    raw,
                };
                self.alarm = digital_alarm(raw, &self.config);
            }
            PointValue::Analog { .. } => {
                let egu = clamp_egu(
                    convert_to_egu(self.config.scale_factor, self.config.deviation, raw),
                    self.config.egu_min,
                    self.config.egu_max,
                );
                self.value = PointValue::Analog { egu, raw };
                self.alarm = analog_alarm(egu, &self.config);
            }
        }
        self.timestamp = Some(now);
    }

    /// Apply an engineering value that was just written along with the raw value it was sent as
    ///
    /// The value is kept as given rather than recomputed from the quantised raw value. Digital
    /// points only take the raw value.
    pub(crate) fn apply_egu(&mut self, egu: f64, raw: u16, now: DateTime<Local>) {
        match self.value {
            PointValue::Digital { .. } => self.apply_raw(raw, now),
            PointValue::Analog { .. } => {
                let egu = clamp_egu(egu, self.config.egu_min, self.config.egu_max);
                self.value = PointValue::Analog { egu, raw };
                self.alarm = analog_alarm(egu, &self.config);
                self.timestamp = Some(now);
            }
        }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ", self.id)?;
        if !self.config.description.is_empty() {
            write!(f, "({}) ", self.config.description)?;
        }
        match self.value {
            PointValue::Digital { state, raw } => write!(f, "{state} raw: {raw}")?,
            PointValue::Analog { egu, raw } => write!(
                f,
                "{:.*} raw: {}",
                usize::from(self.config.decimal_separator_place),
                egu,
                raw
            )?,
        }
        write!(f, " alarm: {}", self.alarm)
    }
}
