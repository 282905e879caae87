use crate::codec::{PointUpdate, ReadCommandParameters};
use crate::common::bits::bit_at;
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
    let bits = cursor
        .read_bytes(byte_count)
        .map_err(|_| AduParseError::InsufficientBytesForByteCount(byte_count, remaining))?;

    // never produce more than requested, even if the device pads the last byte
    let count = std::cmp::min(params.quantity as usize, byte_count * 8);

    let updates = (0..count)
        .filter_map(|index| {
            let value = bit_at(bits, index)?;
            Some(PointUpdate::new(
                point_type,
                params.start_address.wrapping_add(index as u16),
                u16::from(value),
            ))
        })
        .collect();

    Ok(updates)
}
