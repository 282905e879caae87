use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigItem, Configuration};
use crate::processing::ReadCommandIssuer;
use crate::types::PointType;

const MIN_TRIGGER_PERIOD: Duration = Duration::from_millis(1);

struct Schedule {
    item: Arc<ConfigItem>,
    seconds_since_last_poll: i32,
}

/// Periodic poller of the input blocks
///
/// Every tick counts as one second. Each block keeps its own counter and is read with a single
/// command once the counter reaches its acquisition interval.
pub struct Acquisitor {
    issuer: Arc<dyn ReadCommandIssuer>,
    config: Arc<Configuration>,
    schedule: Vec<Schedule>,
}

impl Acquisitor {
    /// Create an acquisitor over every block of the configuration
    pub fn new(issuer: Arc<dyn ReadCommandIssuer>, config: Arc<Configuration>) -> Self {
        let schedule = config
            .items()
            .iter()
            .map(|item| Schedule {
                item: item.clone(),
                seconds_since_last_poll: item.seconds_since_last_poll,
            })
            .collect();
        Self {
            issuer,
            config,
            schedule,
        }
    }

    /// Process a single tick, returning the number of reads issued
    pub fn tick(&mut self) -> usize {
        let mut issued = 0;
        for entry in self.schedule.iter_mut() {
            entry.seconds_since_last_poll = entry.seconds_since_last_poll.saturating_add(1);

            let interval = entry.item.acquisition_interval;
            if interval <= 0 || entry.seconds_since_last_poll < interval {
                continue;
            }
            entry.seconds_since_last_poll = 0;

            if !matches!(
                entry.item.registry_type,
                PointType::DigitalInput | PointType::AnalogInput
            ) {
                continue;
            }

            let result = self.issuer.execute_read_command(
                &entry.item,
                self.config.next_transaction_id(),
                self.config.unit_address(),
                entry.item.start_address,
                entry.item.number_of_registers,
            );
            match result {
                Ok(()) => issued += 1,
                Err(err) => tracing::warn!(
                    "unable to poll {} block at {}: {}",
                    entry.item.registry_type,
                    entry.item.start_address,
                    err
                ),
            }
        }
        issued
    }

    /// Run a tick for every trigger until cancelled or the trigger source goes away
    pub async fn run(mut self, mut trigger: mpsc::Receiver<()>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                x = trigger.recv() => match x {
                    Some(()) => {
                        self.tick();
                    }
                    None => break,
                },
            }
        }
        tracing::info!("acquisition stopped");
    }
}

/// Send a trigger every `period` until cancelled
///
/// Triggers are dropped rather than queued when the acquisitor falls behind. A zero period is
/// raised to one millisecond.
pub fn periodic_trigger(
    period: Duration,
    cancel: CancellationToken,
) -> (mpsc::Receiver<()>, impl std::future::Future<Output = ()> + Send + 'static) {
    let period = period.max(MIN_TRIGGER_PERIOD);
    let (tx, rx) = mpsc::channel(1);
    let future = async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(()) {
                        return;
                    }
                }
            }
        }
    };
    (rx, future)
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::error::{EnqueueError, ProcessingError};
    use crate::types::{TxId, UnitId};

    #[derive(Default)]
    struct Recorder {
        reads: Mutex<Vec<(PointType, TxId, UnitId, u16, u16)>>,
        fail: bool,
    }

    impl ReadCommandIssuer for Recorder {
        fn execute_read_command(
            &self,
            item: &ConfigItem,
            tx_id: TxId,
            unit_id: UnitId,
            start_address: u16,
            quantity: u16,
        ) -> Result<(), ProcessingError> {
            self.reads
                .lock()
                .push((item.registry_type, tx_id, unit_id, start_address, quantity));
            if self.fail {
                return Err(ProcessingError::Enqueue(EnqueueError::QueueFull));
            }
            Ok(())
        }
    }

    fn item(point_type: PointType, start: u16, count: u16, interval: i32) -> ConfigItem {
        ConfigItem {
            acquisition_interval: interval,
            ..ConfigItem::new(point_type, start, count)
        }
    }

    fn acquisitor(items: Vec<ConfigItem>, fail: bool) -> (Arc<Recorder>, Acquisitor) {
        let recorder = Arc::new(Recorder {
            fail,
            ..Recorder::default()
        });
        let config = Arc::new(Configuration::new(UnitId::new(7), 502, items));
        (recorder.clone(), Acquisitor::new(recorder, config))
    }

    #[test]
    fn block_is_read_once_its_interval_elapses() {
        let (recorder, mut acquisitor) =
            acquisitor(vec![item(PointType::AnalogInput, 4000, 4, 3)], false);

        assert_eq!(acquisitor.tick(), 0);
        assert_eq!(acquisitor.tick(), 0);
        assert_eq!(acquisitor.tick(), 1);
        assert_eq!(
            recorder.reads.lock().as_slice(),
            &[(PointType::AnalogInput, TxId::new(0), UnitId::new(7), 4000, 4)]
        );

        // the counter was reset
        assert_eq!(acquisitor.tick(), 0);
        assert_eq!(acquisitor.tick(), 0);
        assert_eq!(acquisitor.tick(), 1);
        assert_eq!(recorder.reads.lock()[1].1, TxId::new(1));
    }

    #[test]
    fn only_input_blocks_are_polled() {
        let (recorder, mut acquisitor) = acquisitor(
            vec![
                item(PointType::DigitalOutput, 2000, 2, 1),
                item(PointType::AnalogOutput, 1000, 1, 1),
                item(PointType::HrLong, 5000, 1, 1),
                item(PointType::DigitalInput, 3000, 8, 1),
            ],
            false,
        );
        assert_eq!(acquisitor.tick(), 1);
        let reads = recorder.reads.lock();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].0, PointType::DigitalInput);
        assert_eq!(reads[0].4, 8);
    }

    #[test]
    fn non_positive_interval_disables_polling() {
        let (recorder, mut acquisitor) = acquisitor(
            vec![
                item(PointType::AnalogInput, 1, 1, 0),
                item(PointType::AnalogInput, 2, 1, -5),
            ],
            false,
        );
        for _ in 0..10 {
            assert_eq!(acquisitor.tick(), 0);
        }
        assert!(recorder.reads.lock().is_empty());
    }

    #[test]
    fn initial_counter_comes_from_the_configuration() {
        let (_, mut acquisitor) = acquisitor(
            vec![ConfigItem {
                seconds_since_last_poll: 4,
                ..item(PointType::DigitalInput, 1, 1, 5)
            }],
            false,
        );
        assert_eq!(acquisitor.tick(), 1);
    }

    #[test]
    fn failure_does_not_stop_the_scan() {
        let (recorder, mut acquisitor) = acquisitor(
            vec![
                item(PointType::AnalogInput, 1, 1, 1),
                item(PointType::DigitalInput, 2, 1, 1),
            ],
            true,
        );
        assert_eq!(acquisitor.tick(), 0);
        assert_eq!(recorder.reads.lock().len(), 2);
    }

    #[tokio::test]
    async fn run_ticks_until_cancelled() {
        let (recorder, acquisitor) =
            acquisitor(vec![item(PointType::AnalogInput, 1, 1, 1)], false);
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(acquisitor.run(rx, cancel.clone()));

        tx.send(()).await.unwrap();
        tx.send(()).await.unwrap();
        // the trigger source going away also ends the loop
        drop(tx);
        task.await.unwrap();
        assert_eq!(recorder.reads.lock().len(), 2);

        let (recorder, acquisitor) =
            self::acquisitor(vec![item(PointType::AnalogInput, 1, 1, 1)], false);
        let (_tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(acquisitor.run(rx, cancel.clone()));
        cancel.cancel();
        task.await.unwrap();
        assert!(recorder.reads.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_trigger_fires_every_period() {
        let cancel = CancellationToken::new();
        let (mut rx, future) = periodic_trigger(Duration::from_secs(1), cancel.clone());
        let task = tokio::spawn(future);

        let start = tokio::time::Instant::now();
        rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(rx.recv().await, None);
    }
}
