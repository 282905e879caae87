use crate::common::function::FunctionCode;
use crate::exception::ExceptionCode;
use crate::types::{PointIdentifier, PointType};

/// Top level error type for commands executed against a device
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RequestError {
    /// An I/O error occurred on the transport
    Io(std::io::ErrorKind),
    /// The device replied with a Modbus exception
    Exception(ExceptionCode),
    /// Command parameters were invalid
    BadRequest(InvalidRequest),
    /// A frame could not be parsed off the stream
    BadFrame(FrameParseError),
    /// The response could not be decoded
    BadResponse(AduParseError),
    /// An internal error occurred in the library itself
    Internal(InternalError),
    /// Timeout occurred before receiving a response from the device
    ResponseTimeout,
    /// No connection could be made to the device
    NoConnection,
    /// The executor was shut down before the command completed
    Shutdown,
}

impl std::error::Error for RequestError {}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RequestError::Io(kind) => {
                f.write_str(std::io::Error::from(*kind).to_string().as_str())
            }
            RequestError::Exception(err) => err.fmt(f),
            RequestError::BadRequest(err) => err.fmt(f),
            RequestError::BadFrame(err) => err.fmt(f),
            RequestError::BadResponse(err) => err.fmt(f),
            RequestError::Internal(err) => err.fmt(f),
            RequestError::ResponseTimeout => f.write_str("response timeout"),
            RequestError::NoConnection => f.write_str("no connection to device"),
            RequestError::Shutdown => f.write_str("the command executor was shut down"),
        }
    }
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::Io(err.kind())
    }
}

impl From<InvalidRequest> for RequestError {
    fn from(err: InvalidRequest) -> Self {
        RequestError::BadRequest(err)
    }
}

impl From<InternalError> for RequestError {
    fn from(err: InternalError) -> Self {
        RequestError::Internal(err)
    }
}

impl From<AduParseError> for RequestError {
    fn from(err: AduParseError) -> Self {
        RequestError::BadResponse(err)
    }
}

impl From<ExceptionCode> for RequestError {
    fn from(err: ExceptionCode) -> Self {
        RequestError::Exception(err)
    }
}

impl From<FrameParseError> for RequestError {
    fn from(err: FrameParseError) -> Self {
        RequestError::BadFrame(err)
    }
}

impl From<Shutdown> for RequestError {
    fn from(_: Shutdown) -> Self {
        RequestError::Shutdown
    }
}

impl From<scursor::ReadError> for RequestError {
    fn from(_: scursor::ReadError) -> Self {
        RequestError::BadResponse(AduParseError::InsufficientBytes)
    }
}

/// Errors that indicate faulty logic in the library itself if they occur
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InternalError {
    /// Insufficient space for write operation
    InsufficientWriteSpace(usize, usize), // written vs remaining space
    /// The calculated frame size exceeds what is allowed by the spec
    FrameTooBig(usize, usize), // calculated size vs allowed maximum
    /// Attempted to read more bytes than present
    InsufficientBytesForRead(usize, usize), // requested vs remaining
    /// Cursor seek operation exceeded the bounds of the underlying buffer
    BadSeekOperation,
}

impl std::error::Error for InternalError {}

impl std::fmt::Display for InternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InternalError::InsufficientWriteSpace(written, remaining) => write!(
                f,
                "attempted to write {written} bytes with {remaining} bytes remaining"
            ),
            InternalError::FrameTooBig(size, max) => write!(
                f,
                "frame length of {size} exceeds the maximum allowed length of {max}"
            ),
            InternalError::InsufficientBytesForRead(requested, remaining) => write!(
                f,
                "attempted to read {requested} bytes with only {remaining} remaining"
            ),
            InternalError::BadSeekOperation => {
                f.write_str("cursor seek operation exceeded the bounds of the underlying buffer")
            }
        }
    }
}

/// Errors that occur while parsing a frame off a stream
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameParseError {
    /// Received TCP frame with the length field set to zero
    MbapLengthZero,
    /// Received TCP frame with length that exceeds max allowed size
    MbapLengthTooBig(usize, usize), // actual size and the maximum size
    /// Received TCP frame within non-Modbus protocol id
    UnknownProtocolId(u16),
}

impl std::error::Error for FrameParseError {}

impl std::fmt::Display for FrameParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FrameParseError::MbapLengthZero => {
                f.write_str("received TCP frame with the length field set to zero")
            }
            FrameParseError::MbapLengthTooBig(size, max) => write!(
                f,
                "received TCP frame with length ({size}) that exceeds max allowed size ({max})"
            ),
            FrameParseError::UnknownProtocolId(id) => {
                write!(f, "received TCP frame with non-Modbus protocol id: {id}")
            }
        }
    }
}

/// Errors that occur while decoding a response
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AduParseError {
    /// Response is too short to be valid
    InsufficientBytes,
    /// Byte count exceeds the number of bytes actually present
    InsufficientBytesForByteCount(usize, usize), // count / remaining
    /// The echoed function code does not match the request
    UnknownResponseFunction(u8, u8, u8), // actual, expected, expected error
}

impl std::error::Error for AduParseError {}

impl std::fmt::Display for AduParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AduParseError::InsufficientBytes => f.write_str("response is too short to be valid"),
            AduParseError::InsufficientBytesForByteCount(count, remaining) => write!(
                f,
                "byte count ({count}) doesn't match the actual number of bytes remaining ({remaining})"
            ),
            AduParseError::UnknownResponseFunction(actual, expected, error) => write!(
                f,
                "received unknown response function code: {actual}. Expected {expected} or {error}"
            ),
        }
    }
}

/// Errors that result because of bad command parameters
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InvalidRequest {
    /// Request contained a quantity of zero
    CountOfZero,
    /// start and count would overflow the u16 address space
    AddressOverflow(u16, u16),
    /// Count exceeds the maximum allowed for this function
    CountTooBigForType(u16, u16), // count / max
    /// The parameters variant does not fit the function code
    ParametersMismatch(FunctionCode),
}

impl std::error::Error for InvalidRequest {}

impl std::fmt::Display for InvalidRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InvalidRequest::CountOfZero => f.write_str("request contains a count of zero"),
            InvalidRequest::AddressOverflow(start, count) => write!(
                f,
                "start == {start} and count == {count} would overflow the representation of u16"
            ),
            InvalidRequest::CountTooBigForType(count, max) => write!(
                f,
                "the request count of {count} exceeds maximum allowed count of {max} for this type"
            ),
            InvalidRequest::ParametersMismatch(function) => {
                write!(f, "command parameters do not match function {function}")
            }
        }
    }
}

/// The command queue could not accept a command
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EnqueueError {
    /// The queue is at capacity
    QueueFull,
    /// The executor task has shut down
    Shutdown,
}

impl std::error::Error for EnqueueError {}

impl std::fmt::Display for EnqueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            EnqueueError::QueueFull => f.write_str("command queue is full"),
            EnqueueError::Shutdown => f.write_str("command executor has shut down"),
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::TrySendError<T>> for EnqueueError {
    fn from(err: tokio::sync::mpsc::error::TrySendError<T>) -> Self {
        match err {
            tokio::sync::mpsc::error::TrySendError::Full(_) => EnqueueError::QueueFull,
            tokio::sync::mpsc::error::TrySendError::Closed(_) => EnqueueError::Shutdown,
        }
    }
}

/// Errors returned by the processing manager when turning intents into commands
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProcessingError {
    /// The operation is not defined for this point type
    UnsupportedPointType(PointType),
    /// No point with this identifier is configured
    UnknownPoint(PointIdentifier),
    /// The command could not be built
    BadRequest(InvalidRequest),
    /// The command could not be queued
    Enqueue(EnqueueError),
}

impl std::error::Error for ProcessingError {}

impl std::fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ProcessingError::UnsupportedPointType(point_type) => {
                write!(f, "operation not supported for point type {point_type}")
            }
            ProcessingError::UnknownPoint(id) => write!(f, "no point configured for {id}"),
            ProcessingError::BadRequest(err) => err.fmt(f),
            ProcessingError::Enqueue(err) => err.fmt(f),
        }
    }
}

impl From<InvalidRequest> for ProcessingError {
    fn from(err: InvalidRequest) -> Self {
        ProcessingError::BadRequest(err)
    }
}

impl From<EnqueueError> for ProcessingError {
    fn from(err: EnqueueError) -> Self {
        ProcessingError::Enqueue(err)
    }
}

/// Indicates that a task has shut down
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Shutdown;

impl std::error::Error for Shutdown {}

impl std::fmt::Display for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("task shut down")
    }
}
