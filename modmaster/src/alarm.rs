//! Alarm classification of point values against their static limits

use crate::config::ConfigItem;

/// Alarm state of a point
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum AlarmType {
    /// value is within limits
    #[default]
    NoAlarm,
    /// analog value above the high limit
    HighAlarm,
    /// analog value below the low limit
    LowAlarm,
    /// digital state differs from its expected value
    AbnormalValue,
}

impl std::fmt::Display for AlarmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlarmType::NoAlarm => f.write_str("NO_ALARM"),
            AlarmType::HighAlarm => f.write_str("HIGH_ALARM"),
            AlarmType::LowAlarm => f.write_str("LOW_ALARM"),
            AlarmType::AbnormalValue => f.write_str("ABNORMAL_VALUE"),
        }
    }
}

/// The high limit is checked first, both comparisons are strict
pub fn analog_alarm(egu: f64, item: &ConfigItem) -> AlarmType {
    if egu > item.high_limit {
        return AlarmType::HighAlarm;
    }
    if egu < item.low_limit {
        return AlarmType::LowAlarm;
    }
    AlarmType::NoAlarm
}

/// Any state other than the configured default is abnormal
pub fn digital_alarm(state: u16, item: &ConfigItem) -> AlarmType {
    if state != item.default_value {
        return AlarmType::AbnormalValue;
    }
    AlarmType::NoAlarm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PointType;

    fn limits(low: f64, high: f64) -> ConfigItem {
        ConfigItem {
            low_limit: low,
            high_limit: high,
            ..ConfigItem::new(PointType::AnalogInput, 0, 1)
        }
    }

    #[test]
    fn value_on_the_limit_is_not_an_alarm() {
        let item = limits(10.0, 50.0);
        assert_eq!(analog_alarm(50.0, &item), AlarmType::NoAlarm);
        assert_eq!(analog_alarm(10.0, &item), AlarmType::NoAlarm);
        assert_eq!(analog_alarm(50.0001, &item), AlarmType::HighAlarm);
        assert_eq!(analog_alarm(9.9999, &item), AlarmType::LowAlarm);
    }

    #[test]
    fn high_limit_wins_when_limits_overlap() {
        let item = limits(100.0, 0.0);
        assert_eq!(analog_alarm(50.0, &item), AlarmType::HighAlarm);
    }

    #[test]
    fn default_limits_never_alarm() {
        let item = ConfigItem::new(PointType::AnalogOutput, 0, 1);
        assert_eq!(analog_alarm(1e300, &item), AlarmType::NoAlarm);
        assert_eq!(analog_alarm(-1e300, &item), AlarmType::NoAlarm);
    }

    #[test]
    fn digital_state_is_compared_to_the_default() {
        let item = ConfigItem {
            default_value: 1,
            ..ConfigItem::new(PointType::DigitalInput, 0, 1)
        };
        assert_eq!(digital_alarm(1, &item), AlarmType::NoAlarm);
        assert_eq!(digital_alarm(0, &item), AlarmType::AbnormalValue);
    }
}
