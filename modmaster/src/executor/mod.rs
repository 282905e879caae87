//! The function executor: a FIFO command queue drained by a single worker that owns the transport
//!
//! Commands are enqueued without blocking through a cloneable [`FunctionExecutor`]. The worker
//! sends one command at a time, waits for the response carrying the same transaction id, and
//! publishes the outcome on the event channel as an [`ExecutorEvent`].

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::codec::{ModbusFunction, PointUpdate};
use crate::common::function::FunctionCode;
use crate::common::phys::{PhysLayer, Transport};
use crate::decode::DecodeLevel;
use crate::error::{EnqueueError, RequestError};
use crate::executor::task::{ExecutorLoop, SessionError};
use crate::executor::tcp::TcpChannelTask;
use crate::retry::RetryStrategy;
use crate::types::TxId;

mod task;
mod tcp;

/// Runtime settings of the executor
#[derive(Copy, Clone, Debug)]
pub struct ExecutorConfig {
    /// capacity of the command queue
    pub max_queued_commands: usize,
    /// how long to wait for the response to a command
    pub response_timeout: Duration,
    /// protocol decoding written to the log
    pub decode: DecodeLevel,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_queued_commands: 32,
            response_timeout: Duration::from_secs(2),
            decode: DecodeLevel::nothing(),
        }
    }
}

/// Values decoded from one successful command
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateBatch {
    /// transaction id of the command
    pub tx_id: TxId,
    /// function that was executed
    pub function: FunctionCode,
    /// every value carried by the response, in address order
    pub updates: Vec<PointUpdate>,
}

/// A command that did not produce a usable response
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CommandFailure {
    /// transaction id of the command
    pub tx_id: TxId,
    /// function that was attempted
    pub function: FunctionCode,
    /// why it failed
    pub error: RequestError,
}

/// Published by the executor once per dequeued command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutorEvent {
    /// the command succeeded
    Update(UpdateBatch),
    /// the command failed
    Failure(CommandFailure),
}

/// Cloneable handle used to queue commands for the executor task
#[derive(Clone, Debug)]
pub struct FunctionExecutor {
    tx: mpsc::Sender<ModbusFunction>,
}

impl FunctionExecutor {
    /// Queue a command without waiting
    ///
    /// Fails if the queue is full or if the executor has shut down
    pub fn enqueue_command(&self, function: ModbusFunction) -> Result<(), EnqueueError> {
        self.tx.try_send(function)?;
        Ok(())
    }
}

fn create_loop(
    config: ExecutorConfig,
    cancel: CancellationToken,
) -> (FunctionExecutor, mpsc::Receiver<ExecutorEvent>, ExecutorLoop) {
    let (tx, rx) = mpsc::channel(config.max_queued_commands);
    let (event_tx, event_rx) = mpsc::channel(config.max_queued_commands);
    let executor_loop = ExecutorLoop::new(
        rx.into(),
        event_tx,
        config.response_timeout,
        config.decode,
        cancel,
    );
    (FunctionExecutor { tx }, event_rx, executor_loop)
}

/// Create the executor for a Modbus TCP device, returning the future that runs it
///
/// The future connects to `addr`, reconnecting with `retry` whenever the connection fails or
/// is lost, and completes once `cancel` fires or every [`FunctionExecutor`] is dropped
pub fn create_tcp_executor(
    addr: SocketAddr,
    config: ExecutorConfig,
    retry: Box<dyn RetryStrategy>,
    cancel: CancellationToken,
) -> (
    FunctionExecutor,
    mpsc::Receiver<ExecutorEvent>,
    impl Future<Output = ()> + Send + 'static,
) {
    let (executor, events, executor_loop) = create_loop(config, cancel);
    let mut task = TcpChannelTask::new(addr, retry, executor_loop);
    let future = async move {
        task.run()
            .instrument(tracing::info_span!("Modbus-Master-TCP", "remote" = ?addr))
            .await;
    };
    (executor, events, future)
}

/// Spawn the executor for a Modbus TCP device onto the runtime
pub fn spawn_tcp_executor(
    addr: SocketAddr,
    config: ExecutorConfig,
    retry: Box<dyn RetryStrategy>,
    cancel: CancellationToken,
) -> (FunctionExecutor, mpsc::Receiver<ExecutorEvent>, JoinHandle<()>) {
    let (executor, events, future) = create_tcp_executor(addr, config, retry, cancel);
    (executor, events, tokio::spawn(future))
}

/// Create an executor that runs over an already established stream
///
/// No reconnection is attempted: once the stream fails, queued commands fail with
/// [`RequestError::NoConnection`] until shutdown
pub fn create_stream_executor<T>(
    stream: T,
    config: ExecutorConfig,
    cancel: CancellationToken,
) -> (
    FunctionExecutor,
    mpsc::Receiver<ExecutorEvent>,
    impl Future<Output = ()> + Send + 'static,
)
where
    T: Transport + 'static,
{
    let (executor, events, mut executor_loop) = create_loop(config, cancel);
    let future = async move {
        let result = {
            let mut phys = PhysLayer::new_stream(stream);
            executor_loop.run(&mut phys).await
        };
        if result != SessionError::Shutdown {
            executor_loop.fail_commands_until_shutdown().await;
        }
        executor_loop.shutdown().await;
    };
    (executor, events, future)
}

/// Spawn an executor that runs over an already established stream
pub fn spawn_stream_executor<T>(
    stream: T,
    config: ExecutorConfig,
    cancel: CancellationToken,
) -> (FunctionExecutor, mpsc::Receiver<ExecutorEvent>, JoinHandle<()>)
where
    T: Transport + 'static,
{
    let (executor, events, future) = create_stream_executor(stream, config, cancel);
    (executor, events, tokio::spawn(future))
}
