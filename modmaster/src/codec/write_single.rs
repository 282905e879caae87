use crate::codec::{PointUpdate, WriteCommandParameters};
use crate::common::cursor::WriteCursor;
use crate::common::traits::Serialize;
use crate::constants::coil;
use crate::error::{InternalError, RequestError};
use crate::types::PointType;

use scursor::ReadCursor;

/// Payload of both single write requests: address followed by the value on the wire
pub(crate) struct SingleWrite {
    address: u16,
    value: u16,
}

impl SingleWrite {
    pub(crate) fn coil(params: &WriteCommandParameters) -> Self {
        Self {
            address: params.output_address,
            value: coil_to_wire(params.value),
        }
    }

    pub(crate) fn register(params: &WriteCommandParameters) -> Self {
        Self {
            address: params.output_address,
            value: params.value,
        }
    }
}

impl Serialize for SingleWrite {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
        cursor.write_u16_be(self.address)?;
        cursor.write_u16_be(self.value)
    }
}

fn coil_to_wire(value: u16) -> u16 {
    if value == 0 {
        coil::OFF
    } else {
        coil::ON
    }
}

fn read_echo(cursor: &mut ReadCursor) -> Result<SingleWrite, RequestError> {
    let address = cursor.read_u16_be()?;
    let value = cursor.read_u16_be()?;
    Ok(SingleWrite { address, value })
}

fn check_echo(expected: &SingleWrite, echo: &SingleWrite) {
    if expected.address != echo.address || expected.value != echo.value {
        tracing::warn!(
            "write echo (address: {:#06X} value: {:#06X}) differs from request (address: {:#06X} value: {:#06X})",
            echo.address,
            echo.value,
            expected.address,
            expected.value
        );
    }
}

pub(crate) fn parse_coil_echo(
    params: &WriteCommandParameters,
    cursor: &mut ReadCursor,
) -> Result<Vec<PointUpdate>, RequestError> {
    let echo = read_echo(cursor)?;
    check_echo(&SingleWrite::coil(params), &echo);
    let state = if echo.value == coil::ON { 1 } else { 0 };
    Ok(vec![PointUpdate::new(
        PointType::DigitalOutput,
        echo.address,
        state,
    )])
}

pub(crate) fn parse_register_echo(
    params: &WriteCommandParameters,
    cursor: &mut ReadCursor,
) -> Result<Vec<PointUpdate>, RequestError> {
    let echo = read_echo(cursor)?;
    check_echo(&SingleWrite::register(params), &echo);
    Ok(vec![PointUpdate::new(
        PointType::AnalogOutput,
        echo.address,
        echo.value,
    )])
}
