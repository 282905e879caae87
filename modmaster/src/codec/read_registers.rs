use crate::codec::{PointUpdate, ReadCommandParameters};
use crate::error::{AduParseError, RequestError};
use crate::types::PointType;

use scursor::ReadCursor;

pub(crate) fn parse(
    params: &ReadCommandParameters,
    point_type: PointType,
    cursor: &mut ReadCursor,
) -> Result<Vec<PointUpdate>, RequestError> {
    let byte_count = cursor.read_u8()? as usize;
    let remaining = cursor.remaining();
    let bytes = cursor
        .read_bytes(byte_count)
        .map_err(|_| AduParseError::InsufficientBytesForByteCount(byte_count, remaining))?;

    let updates = bytes
        .chunks_exact(2)
        .take(params.quantity as usize)
        .zip(0u16..)
        .map(|(word, index)| {
            PointUpdate::new(
                point_type,
                params.start_address.wrapping_add(index),
                u16::from_be_bytes([word[0], word[1]]),
            )
        })
        .collect();

    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CommandHeader, ModbusCommandParameters, ModbusFunction};
    use crate::common::function::FunctionCode;
    use crate::types::{TxId, UnitId};

    fn read(function: FunctionCode, point_type: PointType, quantity: u16) -> ModbusFunction {
        ModbusFunction::create(ModbusCommandParameters::Read(ReadCommandParameters {
            header: CommandHeader::new(function, TxId::new(1), UnitId::new(1)),
            start_address: 1000,
            quantity,
            point_type,
        }))
        .unwrap()
    }

    #[test]
    fn holding_registers_take_the_requested_point_type() {
        let function = read(FunctionCode::ReadHoldingRegisters, PointType::AnalogOutput, 2);
        let response = [
            0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 0x01, 0x03, 0x04, 0x00, 0x0A, 0xFF, 0xFF,
        ];
        assert_eq!(
            function.decode(&response).unwrap(),
            vec![
                PointUpdate::new(PointType::AnalogOutput, 1000, 10),
                PointUpdate::new(PointType::AnalogOutput, 1001, 0xFFFF),
            ]
        );

        let function = read(FunctionCode::ReadHoldingRegisters, PointType::HrLong, 1);
        let response = [0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x12, 0x34];
        assert_eq!(
            function.decode(&response).unwrap(),
            vec![PointUpdate::new(PointType::HrLong, 1000, 0x1234)]
        );
    }

    #[test]
    fn input_registers_are_always_analog_inputs() {
        let function = read(FunctionCode::ReadInputRegisters, PointType::AnalogOutput, 1);
        let response = [0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x01, 0x04, 0x02, 0x00, 0x2A];
        assert_eq!(
            function.decode(&response).unwrap(),
            vec![PointUpdate::new(PointType::AnalogInput, 1000, 42)]
        );
    }

    #[test]
    fn extra_registers_beyond_quantity_are_ignored() {
        let function = read(FunctionCode::ReadInputRegisters, PointType::AnalogInput, 1);
        let response = [
            0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 0x01, 0x04, 0x04, 0x00, 0x01, 0x00, 0x02,
        ];
        assert_eq!(function.decode(&response).unwrap().len(), 1);
    }

    #[test]
    fn truncated_register_data_is_an_error() {
        let function = read(FunctionCode::ReadInputRegisters, PointType::AnalogInput, 2);
        let response = [0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x01, 0x04, 0x04, 0x00, 0x01];
        assert_eq!(
            function.decode(&response),
            Err(RequestError::BadResponse(
                AduParseError::InsufficientBytesForByteCount(4, 2)
            ))
        );
    }
}
