//! Point configuration and its text loader
//!
//! The file holds one point block per line as whitespace separated fields:
//!
//! ```text
//! type count start decimal min max default processing description interval [scale deviation egu_max egu_min abnormal high low seconds_since_poll]
//! ```
//!
//! `#` selects the default for a field. Lines starting with `STA` and `TCP` set the unit
//! address and the TCP port, blank lines and lines starting with `#` are ignored.

use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use crate::types::{PointIdentifier, PointType, TxId, UnitId};

const DEFAULT_TCP_PORT: u16 = 502;
const MIN_FIELDS: usize = 10;

/// Static description of a block of consecutive points sharing the same settings
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigItem {
    /// type of every point in the block
    pub registry_type: PointType,
    /// number of consecutive points in the block
    pub number_of_registers: u16,
    /// address of the first point
    pub start_address: u16,
    /// number of decimals to display
    pub decimal_separator_place: u16,
    /// lowest raw value
    pub min_value: u16,
    /// highest raw value
    pub max_value: u16,
    /// raw value written at startup, and the expected state of digital points
    pub default_value: u16,
    /// free form processing tag
    pub processing_type: String,
    /// human readable name
    pub description: String,
    /// seconds between polls, zero or negative disables polling
    pub acquisition_interval: i32,
    /// `A` in `egu = A * raw + B`
    pub scale_factor: f64,
    /// `B` in `egu = A * raw + B`
    pub deviation: f64,
    /// upper bound of the engineering value
    pub egu_max: f64,
    /// lower bound of the engineering value
    pub egu_min: f64,
    /// raw value considered abnormal
    pub abnormal_value: u16,
    /// analog values above this raise a high alarm
    pub high_limit: f64,
    /// analog values below this raise a low alarm
    pub low_limit: f64,
    /// initial value of the poll counter
    pub seconds_since_last_poll: i32,
}

impl ConfigItem {
    /// Create an item with every optional field at its default
    pub fn new(registry_type: PointType, start_address: u16, number_of_registers: u16) -> Self {
        Self {
            registry_type,
            number_of_registers,
            start_address,
            decimal_separator_place: 0,
            min_value: 0,
            max_value: u16::MAX,
            default_value: 0,
            processing_type: String::new(),
            description: String::new(),
            acquisition_interval: 1,
            scale_factor: 1.0,
            deviation: 0.0,
            egu_max: f64::from(u16::MAX),
            egu_min: 0.0,
            abnormal_value: 0,
            high_limit: f64::MAX,
            low_limit: f64::MIN,
            seconds_since_last_poll: 0,
        }
    }

    /// Identifiers of every point in the block, stopping at the end of the address space
    pub fn point_identifiers(&self) -> impl Iterator<Item = PointIdentifier> + '_ {
        (0..self.number_of_registers).map_while(move |offset| {
            self.start_address
                .checked_add(offset)
                .map(|address| PointIdentifier::new(self.registry_type, address))
        })
    }

    /// true if the block contains this point
    pub fn contains(&self, id: PointIdentifier) -> bool {
        id.point_type == self.registry_type
            && id.address >= self.start_address
            && u32::from(id.address)
                < u32::from(self.start_address) + u32::from(self.number_of_registers)
    }

    /// Parse a single point line
    pub fn parse_line(line: &str) -> Result<Self, FieldError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < MIN_FIELDS {
            return Err(FieldError::MissingFields(fields.len(), MIN_FIELDS));
        }

        let min_value = field_or(&fields, 4, "min", 0)?;
        let max_value = field_or(&fields, 5, "max", 0)?;

        let description = fields[8];
        let description = description.strip_prefix('@').unwrap_or(description);

        let acquisition_interval = match fields[9].parse::<i32>() {
            Ok(x) => x,
            // unparsable, including '#'
            Err(_) => 1,
        };

        Ok(Self {
            registry_type: registry_type(fields[0]),
            number_of_registers: field_or(&fields, 1, "count", 0)?,
            start_address: field_or(&fields, 2, "start", 0)?,
            decimal_separator_place: field_or(&fields, 3, "decimal", 0)?,
            min_value,
            max_value,
            default_value: field_or(&fields, 6, "default", 0)?,
            processing_type: fields[7].to_string(),
            description: description.to_string(),
            acquisition_interval,
            scale_factor: field_or(&fields, 10, "scale", 1.0)?,
            deviation: field_or(&fields, 11, "deviation", 0.0)?,
            egu_max: field_or(&fields, 12, "egu_max", f64::from(max_value))?,
            egu_min: field_or(&fields, 13, "egu_min", f64::from(min_value))?,
            abnormal_value: field_or(&fields, 14, "abnormal", 0)?,
            high_limit: field_or(&fields, 15, "high", f64::MAX)?,
            low_limit: field_or(&fields, 16, "low", f64::MIN)?,
            seconds_since_last_poll: field_or(&fields, 17, "seconds_since_poll", 0)?,
        })
    }
}

fn registry_type(name: &str) -> PointType {
    match name {
        "DO_REG" => PointType::DigitalOutput,
        "DI_REG" => PointType::DigitalInput,
        "IN_REG" => PointType::AnalogInput,
        "HR_INT" => PointType::AnalogOutput,
        _ => PointType::HrLong,
    }
}

/// a field that is absent or `#` takes the default
fn field_or<T: FromStr>(
    fields: &[&str],
    index: usize,
    name: &'static str,
    default: T,
) -> Result<T, FieldError> {
    match fields.get(index) {
        None | Some(&"#") => Ok(default),
        Some(value) => value
            .parse::<T>()
            .map_err(|_| FieldError::InvalidValue(name)),
    }
}

/// Problem with a single configuration line
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldError {
    /// fewer fields than required
    MissingFields(usize, usize), // found / required
    /// the named field couldn't be parsed
    InvalidValue(&'static str),
    /// a `STA` or `TCP` directive without a valid value
    InvalidDirective(&'static str),
}

impl std::error::Error for FieldError {}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FieldError::MissingFields(found, required) => {
                write!(f, "found {found} fields but at least {required} are required")
            }
            FieldError::InvalidValue(name) => write!(f, "invalid value for field '{name}'"),
            FieldError::InvalidDirective(name) => write!(f, "invalid {name} directive"),
        }
    }
}

/// Errors returned when loading a configuration
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// the file couldn't be read
    Io(std::io::ErrorKind),
    /// a line couldn't be parsed
    Line(usize, FieldError), // 1-based line number
}

impl std::error::Error for ConfigError {}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConfigError::Io(kind) => {
                f.write_str(std::io::Error::from(*kind).to_string().as_str())
            }
            ConfigError::Line(line, err) => write!(f, "line {line}: {err}"),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.kind())
    }
}

/// Everything the master needs to know about the device and its points
#[derive(Debug)]
pub struct Configuration {
    unit_address: UnitId,
    tcp_port: u16,
    items: Vec<Arc<ConfigItem>>,
    tx_id: AtomicU16,
}

enum Line {
    Blank,
    UnitAddress(u8),
    TcpPort(u16),
    Item(ConfigItem),
}

fn parse_line(line: &str) -> Result<Line, FieldError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(Line::Blank);
    }

    let mut fields = line.split_whitespace();
    match fields.next() {
        Some("STA") => fields
            .next()
            .and_then(|x| x.parse().ok())
            .map(Line::UnitAddress)
            .ok_or(FieldError::InvalidDirective("STA")),
        Some("TCP") => fields
            .next()
            .and_then(|x| x.parse().ok())
            .map(Line::TcpPort)
            .ok_or(FieldError::InvalidDirective("TCP")),
        _ => ConfigItem::parse_line(line).map(Line::Item),
    }
}

impl Configuration {
    /// Create a configuration from its parts
    pub fn new(unit_address: UnitId, tcp_port: u16, items: Vec<ConfigItem>) -> Self {
        Self {
            unit_address,
            tcp_port,
            items: items.into_iter().map(Arc::new).collect(),
            tx_id: AtomicU16::new(0),
        }
    }

    /// Parse configuration text, failing on the first bad line
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Self::parse_with(text, |number, err| Err(ConfigError::Line(number, err)))
    }

    /// Parse configuration text, skipping bad lines with a warning
    pub fn parse_lenient(text: &str) -> Self {
        let result: Result<Self, std::convert::Infallible> =
            Self::parse_with(text, |number, err| {
                tracing::warn!("skipping configuration line {}: {}", number, err);
                Ok(())
            });
        match result {
            Ok(config) => config,
            Err(never) => match never {},
        }
    }

    fn parse_with<E>(
        text: &str,
        mut on_error: impl FnMut(usize, FieldError) -> Result<(), E>,
    ) -> Result<Self, E> {
        let mut unit_address = UnitId::default();
        let mut tcp_port = DEFAULT_TCP_PORT;
        let mut items = Vec::new();

        for (index, line) in text.lines().enumerate() {
            match parse_line(line) {
                Ok(Line::Blank) => {}
                Ok(Line::UnitAddress(x)) => unit_address = UnitId::new(x),
                Ok(Line::TcpPort(x)) => tcp_port = x,
                Ok(Line::Item(item)) => items.push(item),
                Err(err) => on_error(index + 1, err)?,
            }
        }

        Ok(Self::new(unit_address, tcp_port, items))
    }

    /// Read and parse a configuration file, failing on the first bad line
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// unit id every command is addressed to
    pub fn unit_address(&self) -> UnitId {
        self.unit_address
    }

    /// TCP port of the device
    pub fn tcp_port(&self) -> u16 {
        self.tcp_port
    }

    /// point blocks in file order
    pub fn items(&self) -> &[Arc<ConfigItem>] {
        &self.items
    }

    /// Next transaction id, wrapping after `0xFFFF`
    pub fn next_transaction_id(&self) -> TxId {
        TxId::new(self.tx_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Item whose block contains the point
    pub fn find(&self, id: PointIdentifier) -> Option<&Arc<ConfigItem>> {
        self.items.iter().find(|item| item.contains(id))
    }
}
