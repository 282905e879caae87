use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::acquisitor::{periodic_trigger, Acquisitor};
use crate::common::phys::Transport;
use crate::config::Configuration;
use crate::executor::{
    spawn_stream_executor, spawn_tcp_executor, ExecutorConfig, ExecutorEvent, FunctionExecutor,
};
use crate::processing::ProcessingManager;
use crate::retry::{default_retry_strategy, RetryStrategy};
use crate::store::PointStore;

/// Runtime settings of a [`Master`]
pub struct MasterConfig {
    /// queue size, response timeout and decode level of the executor
    pub executor: ExecutorConfig,
    /// time between acquisition ticks, each tick counts as one second of poll interval
    pub acquisition_period: Duration,
    /// reconnect strategy of the TCP executor
    pub retry: Box<dyn RetryStrategy>,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            acquisition_period: Duration::from_secs(1),
            retry: default_retry_strategy(),
        }
    }
}

/// A running SCADA master: executor, update task and acquisitor over one point store
pub struct Master {
    configuration: Arc<Configuration>,
    processing: Arc<ProcessingManager>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Master {
    /// Spawn a master talking to a Modbus TCP device
    pub fn spawn_tcp(addr: SocketAddr, configuration: Configuration, config: MasterConfig) -> Self {
        let cancel = CancellationToken::new();
        let (executor, events, task) =
            spawn_tcp_executor(addr, config.executor, config.retry, cancel.clone());
        Self::start(
            configuration,
            config.acquisition_period,
            cancel,
            executor,
            events,
            task,
        )
    }

    /// Spawn a master over an already established stream
    ///
    /// The master never reconnects, commands fail once the stream is gone
    pub fn spawn_stream<T>(stream: T, configuration: Configuration, config: MasterConfig) -> Self
    where
        T: Transport + 'static,
    {
        let cancel = CancellationToken::new();
        let (executor, events, task) =
            spawn_stream_executor(stream, config.executor, cancel.clone());
        Self::start(
            configuration,
            config.acquisition_period,
            cancel,
            executor,
            events,
            task,
        )
    }

    fn start(
        configuration: Configuration,
        acquisition_period: Duration,
        cancel: CancellationToken,
        executor: FunctionExecutor,
        events: mpsc::Receiver<ExecutorEvent>,
        executor_task: JoinHandle<()>,
    ) -> Self {
        let configuration = Arc::new(configuration);
        let store = Arc::new(PointStore::from_configuration(&configuration));
        let processing = Arc::new(ProcessingManager::new(store, executor));
        processing.initialize_all();

        tracing::info!(
            "starting master for unit {} with {} points",
            configuration.unit_address(),
            processing.store().len()
        );

        let updates = {
            let processing = processing.clone();
            tokio::spawn(
                async move { processing.run_updates(events).await }
                    .instrument(tracing::info_span!("Updates")),
            )
        };

        let (trigger, trigger_task) = periodic_trigger(acquisition_period, cancel.clone());
        let trigger_task = tokio::spawn(trigger_task);

        let acquisitor = Acquisitor::new(processing.clone(), configuration.clone());
        let acquisitor = tokio::spawn(
            acquisitor
                .run(trigger, cancel.clone())
                .instrument(tracing::info_span!("Acquisitor")),
        );

        Self {
            configuration,
            processing,
            cancel,
            tasks: vec![acquisitor, trigger_task, executor_task, updates],
        }
    }

    /// configuration the master was started with
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// point store kept up to date by the master
    pub fn store(&self) -> &Arc<PointStore> {
        self.processing.store()
    }

    /// manager used to issue commands
    pub fn processing(&self) -> &Arc<ProcessingManager> {
        &self.processing
    }

    /// Stop every task and wait for them to finish
    ///
    /// Queued commands are failed, and every event they produce is applied before this returns
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::warn!("master task failed: {}", err);
            }
        }
        tracing::info!("master shut down");
    }
}
