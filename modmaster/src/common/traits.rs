use crate::common::cursor::WriteCursor;
use crate::error::InternalError;

/// Types that write the function specific payload of a request PDU
pub(crate) trait Serialize {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError>;
}
