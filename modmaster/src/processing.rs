//! Turns read/write intents into commands and applies their results to the point store

use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;

use crate::codec::{
    CommandHeader, ModbusCommandParameters, ModbusFunction, PointUpdate, ReadCommandParameters,
    WriteCommandParameters,
};
use crate::common::function::FunctionCode;
use crate::config::ConfigItem;
use crate::egu::{clamp_egu, convert_to_raw};
use crate::error::ProcessingError;
use crate::executor::{ExecutorEvent, FunctionExecutor};
use crate::point::Point;
use crate::store::PointStore;
use crate::types::{PointIdentifier, PointType, TxId, UnitId};

/// Anything that can issue the read command for a configured block
///
/// Implemented by [`ProcessingManager`], and the seam the acquisitor is driven through
pub trait ReadCommandIssuer: Send + Sync {
    /// Issue a read of `quantity` points starting at `start_address`
    fn execute_read_command(
        &self,
        item: &ConfigItem,
        tx_id: TxId,
        unit_id: UnitId,
        start_address: u16,
        quantity: u16,
    ) -> Result<(), ProcessingError>;
}

/// Function used to read points of a given type
pub fn read_function_for(point_type: PointType) -> FunctionCode {
    match point_type {
        PointType::DigitalOutput => FunctionCode::ReadCoils,
        PointType::DigitalInput => FunctionCode::ReadDiscreteInputs,
        PointType::AnalogInput => FunctionCode::ReadInputRegisters,
        PointType::AnalogOutput | PointType::HrLong => FunctionCode::ReadHoldingRegisters,
    }
}

/// Bridges the point store and the function executor
#[derive(Debug)]
pub struct ProcessingManager {
    store: Arc<PointStore>,
    executor: FunctionExecutor,
}

impl ProcessingManager {
    /// Create a manager over a store and an executor
    pub fn new(store: Arc<PointStore>, executor: FunctionExecutor) -> Self {
        Self { store, executor }
    }

    /// the store updated by this manager
    pub fn store(&self) -> &Arc<PointStore> {
        &self.store
    }

    /// Queue a read of the block with the function matching its type
    pub fn execute_read_command(
        &self,
        item: &ConfigItem,
        tx_id: TxId,
        unit_id: UnitId,
        start_address: u16,
        quantity: u16,
    ) -> Result<(), ProcessingError> {
        let function = ModbusFunction::create(ModbusCommandParameters::Read(
            ReadCommandParameters {
                header: CommandHeader::new(read_function_for(item.registry_type), tx_id, unit_id),
                start_address,
                quantity,
                point_type: item.registry_type,
            },
        ))?;
        self.executor.enqueue_command(function)?;
        Ok(())
    }

    /// Queue a single write, updating the local point first
    ///
    /// Digital outputs are normalized to 0/1. Analog output values are clamped to the raw range.
    /// The local update is confirmed or corrected by the echo and the next poll.
    pub fn execute_write_command(
        &self,
        item: &ConfigItem,
        tx_id: TxId,
        unit_id: UnitId,
        address: u16,
        value: i32,
    ) -> Result<(), ProcessingError> {
        let (function, raw) = match item.registry_type {
            PointType::DigitalOutput => (FunctionCode::WriteSingleCoil, u16::from(value != 0)),
            PointType::AnalogOutput => (FunctionCode::WriteSingleRegister, clamp_raw(value)),
            other => return Err(ProcessingError::UnsupportedPointType(other)),
        };
        self.write(function, tx_id, unit_id, item, address, raw, |point, now| {
            point.apply_raw(raw, now)
        })
    }

    /// Write an engineering value to an analog output
    ///
    /// The value is clamped to `[EGU_Min, EGU_Max]` before conversion. The local point keeps the
    /// clamped value exactly as requested until the echo reports the raw value the device took.
    pub fn write_analog_egu(
        &self,
        item: &ConfigItem,
        tx_id: TxId,
        unit_id: UnitId,
        address: u16,
        egu: f64,
    ) -> Result<(), ProcessingError> {
        let egu = clamp_egu(egu, item.egu_min, item.egu_max);
        let raw = convert_to_raw(item.scale_factor, item.deviation, egu);
        if item.registry_type != PointType::AnalogOutput {
            return self.execute_write_command(item, tx_id, unit_id, address, i32::from(raw));
        }
        self.write(
            FunctionCode::WriteSingleRegister,
            tx_id,
            unit_id,
            item,
            address,
            raw,
            |point, now| point.apply_egu(egu, raw, now),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &self,
        function: FunctionCode,
        tx_id: TxId,
        unit_id: UnitId,
        item: &ConfigItem,
        address: u16,
        raw: u16,
        apply: impl FnOnce(&mut Point, DateTime<Local>),
    ) -> Result<(), ProcessingError> {
        let command = ModbusFunction::create(ModbusCommandParameters::Write(
            WriteCommandParameters {
                header: CommandHeader::new(function, tx_id, unit_id),
                output_address: address,
                value: raw,
            },
        ))?;

        let id = PointIdentifier::new(item.registry_type, address);
        let now = Local::now();
        if self.store.update(id, |point| apply(point, now)).is_none() {
            tracing::warn!("write to {} which is not in the point store", id);
        }

        self.executor.enqueue_command(command)?;
        Ok(())
    }

    /// Apply a startup value to a point as if it had been read
    pub fn initialize_point(
        &self,
        point_type: PointType,
        address: u16,
        default_value: u16,
    ) -> Result<(), ProcessingError> {
        let id = PointIdentifier::new(point_type, address);
        self.store
            .update(id, |point| point.apply_raw(default_value, Local::now()))
            .ok_or(ProcessingError::UnknownPoint(id))
    }

    /// Initialize every point with its configured default value
    pub fn initialize_all(&self) {
        for point in self.store.snapshot() {
            let id = point.id();
            if let Err(err) = self.initialize_point(id.point_type, id.address, point.config().default_value) {
                tracing::warn!("unable to initialize {}: {}", id, err);
            }
        }
    }

    /// Apply one decoded value, returning false if the point isn't in the store
    pub fn apply_update(&self, update: &PointUpdate) -> bool {
        let now = Local::now();
        match self.store.update(update.id, |point| point.apply_raw(update.raw, now)) {
            Some(()) => true,
            None => {
                tracing::warn!("received value for unknown point {}", update.id);
                false
            }
        }
    }

    /// Apply an executor event to the store
    pub fn handle_event(&self, event: ExecutorEvent) {
        match event {
            ExecutorEvent::Update(batch) => {
                for update in &batch.updates {
                    self.apply_update(update);
                }
            }
            ExecutorEvent::Failure(failure) => {
                tracing::warn!(
                    "{} (tx_id: {}) failed: {}",
                    failure.function,
                    failure.tx_id,
                    failure.error
                );
            }
        }
    }

    /// Apply events until the executor shuts down
    pub async fn run_updates(&self, mut events: mpsc::Receiver<ExecutorEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        tracing::info!("event channel closed");
    }
}

impl ReadCommandIssuer for ProcessingManager {
    fn execute_read_command(
        &self,
        item: &ConfigItem,
        tx_id: TxId,
        unit_id: UnitId,
        start_address: u16,
        quantity: u16,
    ) -> Result<(), ProcessingError> {
        ProcessingManager::execute_read_command(self, item, tx_id, unit_id, start_address, quantity)
    }
}

fn clamp_raw(value: i32) -> u16 {
    value.clamp(0, i32::from(u16::MAX)) as u16
}
