use crate::constants::limits;
use crate::error::InvalidRequest;

/// Modbus unit identifier, just a type-safe wrapper around `u8`
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UnitId {
    /// underlying raw value
    pub value: u8,
}

impl UnitId {
    /// Create a new UnitId
    pub const fn new(value: u8) -> Self {
        Self { value }
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::new(1)
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04X}", self.value)
    }
}

/// Modbus TCP transaction identifier used to correlate a response with its request
#[derive(PartialEq, Eq, Copy, Clone, Debug, Default, Hash)]
pub struct TxId {
    value: u16,
}

impl TxId {
    /// Create a transaction id from its raw value
    pub const fn new(value: u16) -> Self {
        TxId { value }
    }

    /// Raw value of the transaction id
    pub const fn to_u16(self) -> u16 {
        self.value
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.value)
    }
}

/// Registry type of a point, fixed at configuration time
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PointType {
    /// Coil (read/write bit)
    DigitalOutput,
    /// Discrete input (read-only bit)
    DigitalInput,
    /// Input register (read-only word)
    AnalogInput,
    /// Holding register (read/write word)
    AnalogOutput,
    /// Holding register holding part of a long value, read like an analog point
    HrLong,
}

impl PointType {
    /// Digital points carry an ON/OFF state
    pub fn is_digital(self) -> bool {
        matches!(self, PointType::DigitalInput | PointType::DigitalOutput)
    }

    /// Analog points carry an engineering-unit value
    pub fn is_analog(self) -> bool {
        !self.is_digital()
    }
}

impl std::fmt::Display for PointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointType::DigitalOutput => f.write_str("DIGITAL_OUTPUT"),
            PointType::DigitalInput => f.write_str("DIGITAL_INPUT"),
            PointType::AnalogInput => f.write_str("ANALOG_INPUT"),
            PointType::AnalogOutput => f.write_str("ANALOG_OUTPUT"),
            PointType::HrLong => f.write_str("HR_LONG"),
        }
    }
}

/// Unique key of a point: its type and address
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PointIdentifier {
    /// registry type of the point
    pub point_type: PointType,
    /// Modbus address of the point
    pub address: u16,
}

impl PointIdentifier {
    /// Create a new identifier
    pub const fn new(point_type: PointType, address: u16) -> Self {
        Self {
            point_type,
            address,
        }
    }
}

impl std::fmt::Display for PointIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.point_type, self.address)
    }
}

/// Start and count tuple used when making read requests.
/// Cannot be constructed with invalid start/count
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressRange {
    /// Starting address of the range
    pub start: u16,
    /// Count of elements in the range
    pub count: u16,
}

impl AddressRange {
    /// Create a new address range
    pub fn try_from(start: u16, count: u16) -> Result<Self, InvalidRequest> {
        if count == 0 {
            return Err(InvalidRequest::CountOfZero);
        }

        let max_start = u16::MAX - (count - 1);

        if start > max_start {
            return Err(InvalidRequest::AddressOverflow(start, count));
        }

        Ok(Self { start, count })
    }

    pub(crate) fn of_read_bits(self) -> Result<Self, InvalidRequest> {
        self.limited_count(limits::MAX_READ_COILS_COUNT)
    }

    pub(crate) fn of_read_registers(self) -> Result<Self, InvalidRequest> {
        self.limited_count(limits::MAX_READ_REGISTERS_COUNT)
    }

    fn limited_count(self, limit: u16) -> Result<Self, InvalidRequest> {
        if self.count > limit {
            return Err(InvalidRequest::CountTooBigForType(self.count, limit));
        }
        Ok(self)
    }
}

impl std::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "start: {:#06X} qty: {}", self.start, self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_start_max_count_of_one_is_allowed() {
        AddressRange::try_from(u16::MAX, 1).unwrap();
    }

    #[test]
    fn address_maximum_range_is_ok() {
        AddressRange::try_from(0, 0xFFFF).unwrap();
    }

    #[test]
    fn address_count_zero_fails_validation() {
        assert_eq!(AddressRange::try_from(0, 0), Err(InvalidRequest::CountOfZero));
    }

    #[test]
    fn start_max_count_of_two_overflows() {
        assert_eq!(
            AddressRange::try_from(u16::MAX, 2),
            Err(InvalidRequest::AddressOverflow(u16::MAX, 2))
        );
    }

    #[test]
    fn read_registers_are_limited_to_125() {
        let range = AddressRange::try_from(0, 126).unwrap();
        assert_eq!(
            range.of_read_registers(),
            Err(InvalidRequest::CountTooBigForType(126, 125))
        );
        assert!(AddressRange::try_from(0, 2000).unwrap().of_read_bits().is_ok());
    }

    #[test]
    fn identifiers_compare_on_both_fields() {
        let a = PointIdentifier::new(PointType::AnalogInput, 10);
        assert_eq!(a, PointIdentifier::new(PointType::AnalogInput, 10));
        assert_ne!(a, PointIdentifier::new(PointType::AnalogOutput, 10));
        assert_ne!(a, PointIdentifier::new(PointType::AnalogInput, 11));
    }

    #[test]
    fn hr_long_is_analog() {
        assert!(PointType::HrLong.is_analog());
        assert!(PointType::DigitalOutput.is_digital());
    }
}
