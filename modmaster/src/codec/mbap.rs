use crate::common::buffer::ReadBuffer;
use crate::common::cursor::WriteCursor;
use crate::common::phys::{format_bytes, PhysLayer};
use crate::common::traits::Serialize;
use crate::decode::{DecodeLevel, FrameDecodeLevel};
use crate::error::{FrameParseError, InternalError, RequestError};
use crate::types::{TxId, UnitId};

pub(crate) mod constants {
    pub(crate) const HEADER_LENGTH: usize = 7;
    pub(crate) const MAX_PDU_LENGTH: usize = 253;
    pub(crate) const MAX_FRAME_LENGTH: usize = HEADER_LENGTH + MAX_PDU_LENGTH;
    // includes the 1 byte unit id
    pub(crate) const MAX_LENGTH_FIELD: usize = MAX_PDU_LENGTH + 1;
}

/// A complete Modbus TCP application data unit: the MBAP header followed by the PDU
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    tx_id: TxId,
    unit_id: UnitId,
    bytes: Vec<u8>,
}

impl Frame {
    fn assemble(tx_id: TxId, unit_id: UnitId, pdu: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(constants::HEADER_LENGTH + pdu.len());
        bytes.extend_from_slice(&tx_id.to_u16().to_be_bytes());
        bytes.extend_from_slice(&[0x00, 0x00]);
        bytes.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
        bytes.push(unit_id.value);
        bytes.extend_from_slice(pdu);
        Self {
            tx_id,
            unit_id,
            bytes,
        }
    }

    /// transaction id from the MBAP header
    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    /// unit id from the MBAP header
    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    /// the whole ADU as it appears on the wire
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// the PDU: function code and payload
    pub fn pdu(&self) -> &[u8] {
        self.bytes.get(constants::HEADER_LENGTH..).unwrap_or(&[])
    }

    /// consume the frame, returning the wire bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

pub(crate) fn format_adu(
    tx_id: TxId,
    unit_id: UnitId,
    function: u8,
    msg: &dyn Serialize,
) -> Result<Frame, InternalError> {
    let mut buffer = [0u8; constants::MAX_FRAME_LENGTH];
    let mut cursor = WriteCursor::new(buffer.as_mut());
    cursor.write_u16_be(tx_id.to_u16())?;
    cursor.write_u16_be(0)?;
    cursor.seek_from_current(2)?; // write the length later
    cursor.write_u8(unit_id.value)?;

    let pdu_length: usize = {
        let start = cursor.position();
        cursor.write_u8(function)?;
        msg.serialize(&mut cursor)?;
        cursor.position() - start
    };

    // write the resulting length
    let length_field = u16::try_from(pdu_length + 1).map_err(|_| {
        InternalError::FrameTooBig(pdu_length + 1, constants::MAX_LENGTH_FIELD)
    })?;
    cursor.seek_from_start(4)?;
    cursor.write_u16_be(length_field)?;

    let total_length = constants::HEADER_LENGTH + pdu_length;

    Ok(Frame {
        tx_id,
        unit_id,
        bytes: buffer[..total_length].to_vec(),
    })
}

#[derive(Clone, Copy)]
struct MbapHeader {
    tx_id: TxId,
    pdu_length: usize,
    unit_id: UnitId,
}

#[derive(Clone, Copy)]
enum ParseState {
    Begin,
    Header(MbapHeader),
}

pub(crate) struct MbapParser {
    state: ParseState,
}

impl MbapParser {
    pub(crate) fn new() -> Self {
        Self {
            state: ParseState::Begin,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.state = ParseState::Begin;
    }

    fn parse_header(cursor: &mut ReadBuffer) -> Result<MbapHeader, RequestError> {
        let tx_id = TxId::new(cursor.read_u16_be()?);
        let protocol_id = cursor.read_u16_be()?;
        let length = cursor.read_u16_be()? as usize;
        let unit_id = UnitId::new(cursor.read_u8()?);

        if protocol_id != 0 {
            return Err(FrameParseError::UnknownProtocolId(protocol_id).into());
        }

        if length > constants::MAX_LENGTH_FIELD {
            return Err(
                FrameParseError::MbapLengthTooBig(length, constants::MAX_LENGTH_FIELD).into(),
            );
        }

        // must be > 0 b/c the 1-byte unit identifier counts towards length
        if length == 0 {
            return Err(FrameParseError::MbapLengthZero.into());
        }

        Ok(MbapHeader {
            tx_id,
            pdu_length: length - 1,
            unit_id,
        })
    }

    /// Err implies the input data is invalid
    /// Ok(None) implies that more data is required to complete parsing
    /// Ok(Some(..)) is a fully parsed frame, and the consumed bytes are discarded
    pub(crate) fn parse(&mut self, cursor: &mut ReadBuffer) -> Result<Option<Frame>, RequestError> {
        match self.state {
            ParseState::Header(header) => {
                if cursor.len() < header.pdu_length {
                    return Ok(None);
                }

                let pdu = cursor.read(header.pdu_length)?;
                let frame = Frame::assemble(header.tx_id, header.unit_id, pdu);
                self.state = ParseState::Begin;
                Ok(Some(frame))
            }
            ParseState::Begin => {
                if cursor.len() < constants::HEADER_LENGTH {
                    return Ok(None);
                }

                self.state = ParseState::Header(Self::parse_header(cursor)?);
                self.parse(cursor)
            }
        }
    }
}

pub(crate) struct FramedReader {
    parser: MbapParser,
    buffer: ReadBuffer,
}

impl FramedReader {
    pub(crate) fn new() -> Self {
        Self {
            parser: MbapParser::new(),
            buffer: ReadBuffer::new(constants::MAX_FRAME_LENGTH),
        }
    }

    /// drop any partial frame left over from a previous session
    pub(crate) fn reset(&mut self) {
        self.parser.reset();
        self.buffer.clear();
    }

    pub(crate) async fn next_frame(
        &mut self,
        io: &mut PhysLayer,
        level: DecodeLevel,
    ) -> Result<Frame, RequestError> {
        loop {
            match self.parser.parse(&mut self.buffer)? {
                Some(frame) => {
                    if level.frame.enabled() {
                        tracing::info!("MBAP RX - {}", FrameDisplay::new(level.frame, &frame));
                    }
                    return Ok(frame);
                }
                None => {
                    self.buffer.read_some(io, level.physical).await?;
                }
            }
        }
    }
}

pub(crate) struct FrameDisplay<'a> {
    level: FrameDecodeLevel,
    frame: &'a Frame,
}

impl<'a> FrameDisplay<'a> {
    pub(crate) fn new(level: FrameDecodeLevel, frame: &'a Frame) -> Self {
        FrameDisplay { level, frame }
    }
}

impl std::fmt::Display for FrameDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "tx_id: {} unit: {} len: {}",
            self.frame.tx_id,
            self.frame.unit_id,
            self.frame.pdu().len()
        )?;
        if self.level.payload_enabled() {
            format_bytes(f, self.frame.pdu())?;
        }
        Ok(())
    }
}
