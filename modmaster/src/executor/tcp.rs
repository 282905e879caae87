use std::net::SocketAddr;

use tokio::net::TcpStream;

use crate::common::phys::PhysLayer;
use crate::executor::task::{ExecutorLoop, SessionError};
use crate::retry::RetryStrategy;

pub(crate) struct TcpChannelTask {
    addr: SocketAddr,
    connect_retry: Box<dyn RetryStrategy>,
    executor_loop: ExecutorLoop,
}

impl TcpChannelTask {
    pub(crate) fn new(
        addr: SocketAddr,
        connect_retry: Box<dyn RetryStrategy>,
        executor_loop: ExecutorLoop,
    ) -> Self {
        Self {
            addr,
            connect_retry,
            executor_loop,
        }
    }

    pub(crate) async fn run(&mut self) {
        self.run_sessions().await;
        self.executor_loop.shutdown().await;
        tracing::info!("executor shut down");
    }

    async fn run_sessions(&mut self) {
        loop {
            if self.executor_loop.is_cancelled() {
                return;
            }

            let connect = tokio::select! {
                _ = self.executor_loop.cancel_token().cancelled() => return,
                x = TcpStream::connect(self.addr) => x,
            };

            match connect {
                Err(err) => {
                    tracing::warn!("error connecting to {}: {}", self.addr, err);
                    let delay = self.connect_retry.after_failed_connect();
                    if self.executor_loop.fail_commands_for(delay).await.is_err() {
                        // cancelled, or every command producer was dropped
                        return;
                    }
                }
                Ok(socket) => {
                    tracing::info!("connected to: {}", self.addr);
                    self.connect_retry.reset();
                    let mut phys = PhysLayer::new_tcp(socket);
                    match self.executor_loop.run(&mut phys).await {
                        SessionError::Shutdown => return,
                        // re-establish the connection
                        SessionError::IoError(_) | SessionError::BadFrame => {
                            let delay = self.connect_retry.after_disconnect();
                            if self.executor_loop.fail_commands_for(delay).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}
