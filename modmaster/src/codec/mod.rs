//! Encoding of commands into Modbus TCP frames and decoding of responses into point updates

use crate::common::cursor::WriteCursor;
use crate::common::function::FunctionCode;
use crate::common::traits::Serialize;
use crate::decode::AppDecodeLevel;
use crate::error::{AduParseError, InternalError, InvalidRequest, RequestError};
use crate::exception::ExceptionCode;
use crate::types::{AddressRange, PointIdentifier, PointType, TxId, UnitId};

use scursor::ReadCursor;

pub(crate) mod mbap;
mod read_bits;
mod read_registers;
mod write_single;

pub use mbap::Frame;

/// Fields carried by every command
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CommandHeader {
    /// function to invoke on the device
    pub function: FunctionCode,
    /// transaction id written to the MBAP header
    pub tx_id: TxId,
    /// unit id written to the MBAP header
    pub unit_id: UnitId,
}

impl CommandHeader {
    /// Create a new header
    pub fn new(function: FunctionCode, tx_id: TxId, unit_id: UnitId) -> Self {
        Self {
            function,
            tx_id,
            unit_id,
        }
    }
}

/// Parameters of the read functions
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReadCommandParameters {
    /// common header
    pub header: CommandHeader,
    /// first address to read
    pub start_address: u16,
    /// number of bits or registers to read
    pub quantity: u16,
    /// type of the points being read, used for holding registers
    pub point_type: PointType,
}

/// Parameters of the single write functions
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WriteCommandParameters {
    /// common header
    pub header: CommandHeader,
    /// address of the coil or register
    pub output_address: u16,
    /// value to write, 0/1 for coils
    pub value: u16,
}

/// Tagged union of the parameters accepted by [`ModbusFunction::create`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ModbusCommandParameters {
    /// read request
    Read(ReadCommandParameters),
    /// write request
    Write(WriteCommandParameters),
}

impl ModbusCommandParameters {
    /// header shared by both variants
    pub fn header(&self) -> &CommandHeader {
        match self {
            ModbusCommandParameters::Read(x) => &x.header,
            ModbusCommandParameters::Write(x) => &x.header,
        }
    }
}

/// A single decoded value: the point it belongs to and its raw value
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PointUpdate {
    /// point the value is for
    pub id: PointIdentifier,
    /// raw value, 0/1 for digital points
    pub raw: u16,
}

impl PointUpdate {
    /// Create a new update
    pub fn new(point_type: PointType, address: u16, raw: u16) -> Self {
        Self {
            id: PointIdentifier::new(point_type, address),
            raw,
        }
    }
}

/// A validated command, one variant per supported function code
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ModbusFunction {
    /// Read Coils (0x01)
    ReadCoils(ReadCommandParameters),
    /// Read Discrete Inputs (0x02)
    ReadDiscreteInputs(ReadCommandParameters),
    /// Read Holding Registers (0x03)
    ReadHoldingRegisters(ReadCommandParameters),
    /// Read Input Registers (0x04)
    ReadInputRegisters(ReadCommandParameters),
    /// Write Single Coil (0x05)
    WriteSingleCoil(WriteCommandParameters),
    /// Write Single Register (0x06)
    WriteSingleRegister(WriteCommandParameters),
}

impl ModbusFunction {
    /// Build the function variant selected by the header's function code
    ///
    /// Fails if the parameter variant doesn't fit the function code or if the
    /// requested range is empty, overflows, or exceeds the Modbus limits
    pub fn create(params: ModbusCommandParameters) -> Result<Self, InvalidRequest> {
        let function = params.header().function;
        match (function, params) {
            (FunctionCode::ReadCoils, ModbusCommandParameters::Read(x)) => {
                read_range(&x)?.of_read_bits()?;
                Ok(ModbusFunction::ReadCoils(x))
            }
            (FunctionCode::ReadDiscreteInputs, ModbusCommandParameters::Read(x)) => {
                read_range(&x)?.of_read_bits()?;
                Ok(ModbusFunction::ReadDiscreteInputs(x))
            }
            (FunctionCode::ReadHoldingRegisters, ModbusCommandParameters::Read(x)) => {
                read_range(&x)?.of_read_registers()?;
                Ok(ModbusFunction::ReadHoldingRegisters(x))
            }
            (FunctionCode::ReadInputRegisters, ModbusCommandParameters::Read(x)) => {
                read_range(&x)?.of_read_registers()?;
                Ok(ModbusFunction::ReadInputRegisters(x))
            }
            (FunctionCode::WriteSingleCoil, ModbusCommandParameters::Write(x)) => {
                Ok(ModbusFunction::WriteSingleCoil(x))
            }
            (FunctionCode::WriteSingleRegister, ModbusCommandParameters::Write(x)) => {
                Ok(ModbusFunction::WriteSingleRegister(x))
            }
            _ => Err(InvalidRequest::ParametersMismatch(function)),
        }
    }

    /// the parameters this function was built from
    pub fn parameters(&self) -> ModbusCommandParameters {
        match self {
            ModbusFunction::ReadCoils(x)
            | ModbusFunction::ReadDiscreteInputs(x)
            | ModbusFunction::ReadHoldingRegisters(x)
            | ModbusFunction::ReadInputRegisters(x) => ModbusCommandParameters::Read(*x),
            ModbusFunction::WriteSingleCoil(x) | ModbusFunction::WriteSingleRegister(x) => {
                ModbusCommandParameters::Write(*x)
            }
        }
    }

    /// function code of the variant
    pub fn function_code(&self) -> FunctionCode {
        match self {
            ModbusFunction::ReadCoils(_) => FunctionCode::ReadCoils,
            ModbusFunction::ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            ModbusFunction::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            ModbusFunction::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            ModbusFunction::WriteSingleCoil(_) => FunctionCode::WriteSingleCoil,
            ModbusFunction::WriteSingleRegister(_) => FunctionCode::WriteSingleRegister,
        }
    }

    fn header(&self) -> CommandHeader {
        *self.parameters().header()
    }

    /// transaction id the command is sent with
    pub fn tx_id(&self) -> TxId {
        self.header().tx_id
    }

    /// unit id the command is sent to
    pub fn unit_id(&self) -> UnitId {
        self.header().unit_id
    }

    /// Encode the command into a complete ADU
    pub fn encode(&self) -> Result<Frame, RequestError> {
        let header = self.header();
        let function = self.function_code().get_value();
        let frame = match self {
            ModbusFunction::ReadCoils(x)
            | ModbusFunction::ReadDiscreteInputs(x)
            | ModbusFunction::ReadHoldingRegisters(x)
            | ModbusFunction::ReadInputRegisters(x) => {
                mbap::format_adu(header.tx_id, header.unit_id, function, x)?
            }
            ModbusFunction::WriteSingleCoil(x) => mbap::format_adu(
                header.tx_id,
                header.unit_id,
                function,
                &write_single::SingleWrite::coil(x),
            )?,
            ModbusFunction::WriteSingleRegister(x) => mbap::format_adu(
                header.tx_id,
                header.unit_id,
                function,
                &write_single::SingleWrite::register(x),
            )?,
        };
        Ok(frame)
    }

    /// Decode a complete response ADU into the point updates it carries
    pub fn decode(&self, response: &[u8]) -> Result<Vec<PointUpdate>, RequestError> {
        let pdu = response
            .get(mbap::constants::HEADER_LENGTH..)
            .ok_or(AduParseError::InsufficientBytes)?;
        self.decode_pdu(pdu)
    }

    pub(crate) fn decode_pdu(&self, pdu: &[u8]) -> Result<Vec<PointUpdate>, RequestError> {
        let mut cursor = ReadCursor::new(pdu);
        let expected = self.function_code();
        let function = cursor.read_u8()?;

        if function != expected.get_value() {
            if function == expected.as_error() {
                let code = cursor.read_u8()?;
                return Err(RequestError::Exception(ExceptionCode::from(code)));
            }
            return Err(AduParseError::UnknownResponseFunction(
                function,
                expected.get_value(),
                expected.as_error(),
            )
            .into());
        }

        match self {
            ModbusFunction::ReadCoils(x) => {
                read_bits::parse(x, PointType::DigitalOutput, &mut cursor)
            }
            ModbusFunction::ReadDiscreteInputs(x) => {
                read_bits::parse(x, PointType::DigitalInput, &mut cursor)
            }
            ModbusFunction::ReadHoldingRegisters(x) => {
                read_registers::parse(x, x.point_type, &mut cursor)
            }
            ModbusFunction::ReadInputRegisters(x) => {
                read_registers::parse(x, PointType::AnalogInput, &mut cursor)
            }
            ModbusFunction::WriteSingleCoil(x) => write_single::parse_coil_echo(x, &mut cursor),
            ModbusFunction::WriteSingleRegister(x) => {
                write_single::parse_register_echo(x, &mut cursor)
            }
        }
    }
}

fn read_range(params: &ReadCommandParameters) -> Result<AddressRange, InvalidRequest> {
    AddressRange::try_from(params.start_address, params.quantity)
}

impl Serialize for ReadCommandParameters {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
        cursor.write_u16_be(self.start_address)?;
        cursor.write_u16_be(self.quantity)
    }
}

impl std::fmt::Display for ModbusFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.parameters() {
            ModbusCommandParameters::Read(x) => write!(
                f,
                "{} start: {:#06X} qty: {}",
                self.function_code(),
                x.start_address,
                x.quantity
            ),
            ModbusCommandParameters::Write(x) => write!(
                f,
                "{} address: {:#06X} value: {}",
                self.function_code(),
                x.output_address,
                x.value
            ),
        }
    }
}

/// Renders a command at the requested application decode level
pub(crate) struct CommandDisplay<'a> {
    level: AppDecodeLevel,
    function: &'a ModbusFunction,
}

impl<'a> CommandDisplay<'a> {
    pub(crate) fn new(level: AppDecodeLevel, function: &'a ModbusFunction) -> Self {
        Self { level, function }
    }
}

impl std::fmt::Display for CommandDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.level.data_headers() {
            write!(f, "{}", self.function)
        } else {
            write!(f, "{}", self.function.function_code())
        }
    }
}

/// Renders decoded updates at the requested application decode level
pub(crate) struct UpdatesDisplay<'a> {
    level: AppDecodeLevel,
    function: FunctionCode,
    updates: &'a [PointUpdate],
}

impl<'a> UpdatesDisplay<'a> {
    pub(crate) fn new(
        level: AppDecodeLevel,
        function: FunctionCode,
        updates: &'a [PointUpdate],
    ) -> Self {
        Self {
            level,
            function,
            updates,
        }
    }
}

impl std::fmt::Display for UpdatesDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.function)?;
        if self.level.data_headers() {
            write!(f, " count: {}", self.updates.len())?;
        }
        if self.level.data_values() {
            for update in self.updates {
                write!(f, "\n{} = {}", update.id, update.raw)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(function: FunctionCode) -> CommandHeader {
        CommandHeader::new(function, TxId::new(0x0102), UnitId::new(1))
    }

    fn read(function: FunctionCode, start: u16, quantity: u16) -> ModbusCommandParameters {
        ModbusCommandParameters::Read(ReadCommandParameters {
            header: header(function),
            start_address: start,
            quantity,
            point_type: PointType::AnalogOutput,
        })
    }

    fn write(function: FunctionCode, address: u16, value: u16) -> ModbusCommandParameters {
        ModbusCommandParameters::Write(WriteCommandParameters {
            header: header(function),
            output_address: address,
            value,
        })
    }

    #[test]
    fn encodes_read_holding_registers() {
        let function =
            ModbusFunction::create(read(FunctionCode::ReadHoldingRegisters, 10, 3)).unwrap();
        let frame = function.encode().unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[0x01, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x0A, 0x00, 0x03]
        );
        assert_eq!(frame.tx_id(), TxId::new(0x0102));
        assert_eq!(frame.unit_id(), UnitId::new(1));
    }

    #[test]
    fn encodes_write_single_coil_as_on_off_constants() {
        let on = ModbusFunction::create(write(FunctionCode::WriteSingleCoil, 10, 1)).unwrap();
        assert_eq!(
            on.encode().unwrap().pdu(),
            &[0x05, 0x00, 0x0A, 0xFF, 0x00]
        );
        let off = ModbusFunction::create(write(FunctionCode::WriteSingleCoil, 10, 0)).unwrap();
        assert_eq!(
            off.encode().unwrap().pdu(),
            &[0x05, 0x00, 0x0A, 0x00, 0x00]
        );
    }

    #[test]
    fn encodes_write_single_register() {
        let function =
            ModbusFunction::create(write(FunctionCode::WriteSingleRegister, 1000, 0xCAFE)).unwrap();
        assert_eq!(
            function.encode().unwrap().as_bytes(),
            &[0x01, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x06, 0x03, 0xE8, 0xCA, 0xFE]
        );
    }

    #[test]
    fn rejects_parameters_that_do_not_fit_the_function() {
        assert_eq!(
            ModbusFunction::create(write(FunctionCode::ReadCoils, 0, 1)),
            Err(InvalidRequest::ParametersMismatch(FunctionCode::ReadCoils))
        );
        assert_eq!(
            ModbusFunction::create(read(FunctionCode::WriteSingleRegister, 0, 1)),
            Err(InvalidRequest::ParametersMismatch(
                FunctionCode::WriteSingleRegister
            ))
        );
    }

    #[test]
    fn validates_read_ranges() {
        assert_eq!(
            ModbusFunction::create(read(FunctionCode::ReadInputRegisters, 0, 0)),
            Err(InvalidRequest::CountOfZero)
        );
        assert_eq!(
            ModbusFunction::create(read(FunctionCode::ReadInputRegisters, 0, 126)),
            Err(InvalidRequest::CountTooBigForType(126, 125))
        );
        assert_eq!(
            ModbusFunction::create(read(FunctionCode::ReadDiscreteInputs, 0xFFFF, 2)),
            Err(InvalidRequest::AddressOverflow(0xFFFF, 2))
        );
        assert!(ModbusFunction::create(read(FunctionCode::ReadCoils, 0, 2000)).is_ok());
    }

    #[test]
    fn decodes_exception_response() {
        let function =
            ModbusFunction::create(read(FunctionCode::ReadHoldingRegisters, 10, 3)).unwrap();
        let response = [0x01, 0x02, 0x00, 0x00, 0x00, 0x03, 0x01, 0x83, 0x02];
        assert_eq!(
            function.decode(&response),
            Err(RequestError::Exception(ExceptionCode::IllegalDataAddress))
        );
    }

    #[test]
    fn exception_without_a_code_is_too_short() {
        let function =
            ModbusFunction::create(read(FunctionCode::ReadHoldingRegisters, 10, 3)).unwrap();
        let response = [0x01, 0x02, 0x00, 0x00, 0x00, 0x02, 0x01, 0x83];
        assert_eq!(
            function.decode(&response),
            Err(RequestError::BadResponse(AduParseError::InsufficientBytes))
        );
    }

    #[test]
    fn rejects_mismatched_function_code() {
        let function =
            ModbusFunction::create(read(FunctionCode::ReadInputRegisters, 10, 1)).unwrap();
        let response = [0x01, 0x02, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x07];
        assert_eq!(
            function.decode(&response),
            Err(RequestError::BadResponse(
                AduParseError::UnknownResponseFunction(0x03, 0x04, 0x84)
            ))
        );
    }

    #[test]
    fn rejects_response_shorter_than_header() {
        let function =
            ModbusFunction::create(read(FunctionCode::ReadInputRegisters, 10, 1)).unwrap();
        assert_eq!(
            function.decode(&[0x01, 0x02, 0x00]),
            Err(RequestError::BadResponse(AduParseError::InsufficientBytes))
        );
        assert_eq!(
            function.decode(&[0x01, 0x02, 0x00, 0x00, 0x00, 0x01, 0x01]),
            Err(RequestError::BadResponse(AduParseError::InsufficientBytes))
        );
    }

    /// device that answers a read request with `value(address)` for every requested address
    fn respond_to_read(request: &Frame, value: impl Fn(u16) -> u16) -> Vec<u8> {
        let pdu = request.pdu();
        let start = u16::from_be_bytes([pdu[1], pdu[2]]);
        let quantity = u16::from_be_bytes([pdu[3], pdu[4]]);
        let mut body = Vec::new();
        if pdu[0] <= 0x02 {
            let mut bytes = vec![0u8; usize::from(quantity).div_ceil(8)];
            for i in 0..quantity {
                if value(start + i) != 0 {
                    bytes[usize::from(i / 8)] |= 1 << (i % 8);
                }
            }
            body.extend(bytes);
        } else {
            for i in 0..quantity {
                body.extend(value(start + i).to_be_bytes());
            }
        }
        let mut response = request.as_bytes()[0..4].to_vec();
        response.extend(((body.len() + 3) as u16).to_be_bytes());
        response.extend([request.as_bytes()[6], pdu[0], body.len() as u8]);
        response.extend(body);
        response
    }

    #[test]
    fn reads_round_trip_through_a_synthetic_device() {
        for (function, point_type) in [
            (FunctionCode::ReadCoils, PointType::DigitalOutput),
            (FunctionCode::ReadDiscreteInputs, PointType::DigitalInput),
            (FunctionCode::ReadHoldingRegisters, PointType::AnalogOutput),
            (FunctionCode::ReadInputRegisters, PointType::AnalogInput),
        ] {
            let command = ModbusFunction::create(read(function, 100, 10)).unwrap();
            let value = |address: u16| {
                if point_type.is_digital() {
                    address % 3 % 2
                } else {
                    address * 7
                }
            };
            let response = respond_to_read(&command.encode().unwrap(), value);
            let expected: Vec<_> = (100..110)
                .map(|address| PointUpdate::new(point_type, address, value(address)))
                .collect();
            assert_eq!(command.decode(&response).unwrap(), expected);
        }
    }

    #[test]
    fn formats_updates_with_values() {
        let updates = [
            PointUpdate::new(PointType::DigitalInput, 100, 1),
            PointUpdate::new(PointType::DigitalInput, 101, 0),
        ];
        let text = UpdatesDisplay::new(
            AppDecodeLevel::DataValues,
            FunctionCode::ReadDiscreteInputs,
            &updates,
        )
        .to_string();
        assert_eq!(
            text,
            "READ DISCRETE INPUTS (0x02) count: 2\nDIGITAL_INPUT:100 = 1\nDIGITAL_INPUT:101 = 0"
        );
    }
}
