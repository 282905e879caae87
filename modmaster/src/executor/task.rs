use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::channel::Receiver;
use crate::codec::mbap::{FrameDisplay, FramedReader};
use crate::codec::{CommandDisplay, ModbusFunction, PointUpdate, UpdatesDisplay};
use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::error::{RequestError, Shutdown};
use crate::executor::{CommandFailure, ExecutorEvent, UpdateBatch};

/**
* We execute commands in a session until one of the following occurs
*/
#[derive(Debug, PartialEq)]
pub(crate) enum SessionError {
    /// the stream errors
    IoError(std::io::ErrorKind),
    /// unrecoverable framing issue,
    BadFrame,
    /// cancellation was requested or every command producer was dropped
    Shutdown,
}

impl From<Shutdown> for SessionError {
    fn from(_: Shutdown) -> Self {
        SessionError::Shutdown
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SessionError::IoError(err) => {
                write!(f, "I/O error: {err}")
            }
            SessionError::BadFrame => {
                write!(f, "Parser encountered a bad frame")
            }
            SessionError::Shutdown => {
                write!(f, "Shutdown was requested")
            }
        }
    }
}

impl SessionError {
    pub(crate) fn from_request_err(err: RequestError) -> Option<Self> {
        match err {
            RequestError::Io(x) => Some(SessionError::IoError(x)),
            RequestError::BadFrame(_) => Some(SessionError::BadFrame),
            // all other errors don't kill the loop
            _ => None,
        }
    }
}

pub(crate) struct ExecutorLoop {
    rx: Receiver<ModbusFunction>,
    events: mpsc::Sender<ExecutorEvent>,
    reader: FramedReader,
    response_timeout: Duration,
    decode: DecodeLevel,
    cancel: CancellationToken,
}

impl ExecutorLoop {
    pub(crate) fn new(
        rx: Receiver<ModbusFunction>,
        events: mpsc::Sender<ExecutorEvent>,
        response_timeout: Duration,
        decode: DecodeLevel,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rx,
            events,
            reader: FramedReader::new(),
            response_timeout,
            decode,
            cancel,
        }
    }

    /// wait for the next queued command, giving priority to cancellation
    async fn next_command(&mut self) -> Result<ModbusFunction, Shutdown> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Shutdown),
            cmd = self.rx.recv() => cmd,
        }
    }

    pub(crate) async fn run(&mut self, io: &mut PhysLayer) -> SessionError {
        // anything left in the parser belongs to a previous connection
        self.reader.reset();
        loop {
            if let Err(err) = self.poll(io).await {
                tracing::warn!("ending session: {}", err);
                return err;
            }
        }
    }

    pub(crate) async fn poll(&mut self, io: &mut PhysLayer) -> Result<(), SessionError> {
        let cmd = self.next_command().await?;
        self.run_one_command(io, cmd).await
    }

    async fn run_one_command(
        &mut self,
        io: &mut PhysLayer,
        function: ModbusFunction,
    ) -> Result<(), SessionError> {
        let tx_id = function.tx_id();
        let result = self
            .execute_command(io, &function)
            .instrument(tracing::info_span!("Transaction", tx_id = %tx_id))
            .await;

        match result {
            Ok(updates) => {
                self.publish(ExecutorEvent::Update(UpdateBatch {
                    tx_id,
                    function: function.function_code(),
                    updates,
                }))
                .await;
            }
            Err(err) => {
                // Fail the command in ONE place
                tracing::warn!("command error: {}", err);
                self.fail(&function, err).await;

                // some request errors are a session error that will
                // bubble up and close the session
                if let Some(err) = SessionError::from_request_err(err) {
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    async fn execute_command(
        &mut self,
        io: &mut PhysLayer,
        function: &ModbusFunction,
    ) -> Result<Vec<PointUpdate>, RequestError> {
        let request = function.encode()?;

        if self.decode.app.enabled() {
            tracing::info!("PDU TX - {}", CommandDisplay::new(self.decode.app, function));
        }
        if self.decode.frame.enabled() {
            tracing::info!("MBAP TX - {}", FrameDisplay::new(self.decode.frame, &request));
        }

        io.write(request.as_bytes(), self.decode.physical).await?;

        let deadline = Instant::now() + self.response_timeout;

        // loop until we get a response with the correct tx id or we timeout
        let response = loop {
            let frame = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(RequestError::ResponseTimeout);
                }
                frame = self.reader.next_frame(io, self.decode) => {
                    frame?
                }
            };

            if frame.tx_id() != request.tx_id() {
                tracing::warn!(
                    "received {} while expecting {}",
                    frame.tx_id(),
                    request.tx_id()
                );
                continue; // next iteration of loop
            }

            break frame;
        };

        let updates = function.decode_pdu(response.pdu())?;

        if self.decode.app.enabled() {
            tracing::info!(
                "PDU RX - {}",
                UpdatesDisplay::new(self.decode.app, function.function_code(), &updates)
            );
        }

        Ok(updates)
    }

    async fn publish(&mut self, event: ExecutorEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("event receiver dropped, discarding event");
        }
    }

    async fn fail(&mut self, function: &ModbusFunction, error: RequestError) {
        self.publish(ExecutorEvent::Failure(CommandFailure {
            tx_id: function.tx_id(),
            function: function.function_code(),
            error,
        }))
        .await;
    }

    async fn fail_next_command(&mut self) -> Result<(), Shutdown> {
        let cmd = self.next_command().await?;
        self.fail(&cmd, RequestError::NoConnection).await;
        Ok(())
    }

    /// while there is no connection, fail every command that is dequeued until the delay elapses
    pub(crate) async fn fail_commands_for(&mut self, duration: Duration) -> Result<(), Shutdown> {
        let deadline = Instant::now() + duration;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    // Timeout occurred
                    return Ok(())
                }
                x = self.fail_next_command() => {
                    x?
                }
            }
        }
    }

    /// with no transport left to use, fail commands until shutdown
    pub(crate) async fn fail_commands_until_shutdown(&mut self) {
        while self.fail_next_command().await.is_ok() {}
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Reject further commands and report everything still queued as shut down
    pub(crate) async fn shutdown(&mut self) {
        let remaining = self.rx.close_and_drain();
        if !remaining.is_empty() {
            tracing::info!("discarding {} queued command(s)", remaining.len());
        }
        for cmd in remaining {
            self.fail(&cmd, RequestError::Shutdown).await;
        }
    }
}
