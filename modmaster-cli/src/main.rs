//! Command-line SCADA master

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;

use modmaster::executor::ExecutorConfig;
use modmaster::*;

mod automation;

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("unable to read {path}: {1}", path = .0.display())]
    Read(PathBuf, std::io::Error),
    #[error("bad configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("unable to wait for ctrl-c: {0}")]
    Signal(std::io::Error),
}

#[derive(Parser)]
#[command(name = "modmaster")]
#[command(about = "A command line SCADA master that polls a Modbus TCP device using the modmaster crate")]
#[command(version)]
struct Cli {
    #[arg(short = 'c', long, default_value = "points.txt", help = "Point configuration file")]
    config: PathBuf,

    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST), help = "IP address of the device")]
    host: IpAddr,

    #[arg(short = 'p', long, help = "TCP port of the device, overrides the configuration")]
    port: Option<u16>,

    #[arg(long, default_value_t = 1000, help = "Acquisition tick period in milliseconds")]
    tick: u64,

    #[arg(long, default_value_t = 2000, help = "Response timeout in milliseconds")]
    timeout: u64,

    #[arg(long, value_enum, default_value_t = AppLevel::DataValues, help = "Application layer decoding")]
    decode: AppLevel,

    #[arg(long, value_enum, default_value_t = FrameLevel::Nothing, help = "MBAP frame decoding")]
    frame: FrameLevel,

    #[arg(long, value_enum, default_value_t = PhysLevel::Nothing, help = "Physical layer decoding")]
    phys: PhysLevel,

    #[arg(long, help = "Skip malformed configuration lines instead of failing")]
    lenient: bool,

    #[arg(short = 'a', long, help = "Run the fire suppression automation")]
    automation: bool,

    #[arg(long, default_value_t = 1, help = "Seconds between automation cycles")]
    automation_period: u64,

    #[arg(short = 'r', long, help = "Print every point with this period in milliseconds")]
    report: Option<u64>,
}

#[derive(Copy, Clone, ValueEnum)]
enum AppLevel {
    Nothing,
    FunctionCode,
    DataHeaders,
    DataValues,
}

#[derive(Copy, Clone, ValueEnum)]
enum FrameLevel {
    Nothing,
    Header,
    Payload,
}

#[derive(Copy, Clone, ValueEnum)]
enum PhysLevel {
    Nothing,
    Length,
    Data,
}

impl Cli {
    fn decode_level(&self) -> DecodeLevel {
        let app = match self.decode {
            AppLevel::Nothing => AppDecodeLevel::Nothing,
            AppLevel::FunctionCode => AppDecodeLevel::FunctionCode,
            AppLevel::DataHeaders => AppDecodeLevel::DataHeaders,
            AppLevel::DataValues => AppDecodeLevel::DataValues,
        };
        let frame = match self.frame {
            FrameLevel::Nothing => FrameDecodeLevel::Nothing,
            FrameLevel::Header => FrameDecodeLevel::Header,
            FrameLevel::Payload => FrameDecodeLevel::Payload,
        };
        let physical = match self.phys {
            PhysLevel::Nothing => PhysDecodeLevel::Nothing,
            PhysLevel::Length => PhysDecodeLevel::Length,
            PhysLevel::Data => PhysDecodeLevel::Data,
        };
        DecodeLevel::new(app, frame, physical)
    }

    fn load_configuration(&self) -> Result<Configuration, Error> {
        if !self.lenient {
            return Ok(Configuration::from_file(&self.config)?);
        }
        let text = std::fs::read_to_string(&self.config)
            .map_err(|err| Error::Read(self.config.clone(), err))?;
        Ok(Configuration::parse_lenient(&text))
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    if let Err(ref e) = run().await {
        println!("error: {e}");
    }

    Ok(())
}

async fn run() -> Result<(), Error> {
    let cli = Cli::parse();

    let configuration = cli.load_configuration()?;
    let addr = SocketAddr::new(cli.host, cli.port.unwrap_or(configuration.tcp_port()));

    let master = Master::spawn_tcp(
        addr,
        configuration,
        MasterConfig {
            executor: ExecutorConfig {
                response_timeout: Duration::from_millis(cli.timeout),
                decode: cli.decode_level(),
                ..ExecutorConfig::default()
            },
            acquisition_period: Duration::from_millis(cli.tick),
            ..MasterConfig::default()
        },
    );

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    if cli.automation {
        let automation = automation::Automation::new(
            master.processing().clone(),
            master.configuration().clone(),
        );
        tasks.push(tokio::spawn(automation.run(
            Duration::from_secs(cli.automation_period),
            cancel.clone(),
        )));
    }

    if let Some(period) = cli.report {
        tasks.push(tokio::spawn(report(
            master.store().clone(),
            Duration::from_millis(period.max(1)),
            cancel.clone(),
        )));
    }

    let result = tokio::signal::ctrl_c().await.map_err(Error::Signal);
    tracing::info!("shutting down");

    cancel.cancel();
    join_all(tasks).await;
    master.shutdown().await;

    result
}

/// Wait for every task, logging the ones that panicked or were aborted
///
/// Returns how many did not finish normally
async fn join_all(tasks: Vec<tokio::task::JoinHandle<()>>) -> usize {
    let mut failed = 0;
    for task in tasks {
        if let Err(err) = task.await {
            tracing::error!("task ended abnormally: {}", err);
            failed += 1;
        }
    }
    failed
}

async fn report(store: std::sync::Arc<PointStore>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                for point in store.snapshot() {
                    match point.timestamp() {
                        Some(time) => println!("{} {point}", time.format("%H:%M:%S%.3f")),
                        None => println!("-            {point}"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_all_reports_tasks_that_panicked() {
        let tasks = vec![
            tokio::spawn(async {}),
            tokio::spawn(async { panic!("automation failed") }),
            tokio::spawn(async {}),
        ];
        assert_eq!(join_all(tasks).await, 1);
    }
}
