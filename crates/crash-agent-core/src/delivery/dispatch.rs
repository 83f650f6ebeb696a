use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use crate::config::DispatchMode;
use crate::transport::{Ack, DeliveryRequest, Transport, TransportError};

const SEND_WORKER_NAME: &str = "crash-agent-send";

pub(crate) enum SendPoll {
    Waiting,
    Ready(Result<Ack, TransportError>),
}

/// A send that has been issued and whose result may not be known yet.
pub(crate) struct PendingSend {
    receiver: Receiver<Result<Ack, TransportError>>,
}

impl PendingSend {
    pub(crate) fn start(
        transport: &Arc<dyn Transport>,
        request: DeliveryRequest,
        mode: DispatchMode,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        match mode {
            DispatchMode::Inline => {
                let _ = tx.send(run_send(transport.as_ref(), &request));
            }
            DispatchMode::Background => {
                let worker_transport = Arc::clone(transport);
                let worker_tx = tx.clone();
                let spawned = thread::Builder::new()
                    .name(SEND_WORKER_NAME.to_string())
                    .spawn(move || {
                        let _ = worker_tx.send(run_send(worker_transport.as_ref(), &request));
                    });
                if let Err(err) = spawned {
                    let _ = tx.send(Err(TransportError::Request(format!(
                        "failed to spawn send worker: {err}"
                    ))));
                }
            }
        }
        Self { receiver: rx }
    }

    /// Never blocks.
    pub(crate) fn poll(&mut self) -> SendPoll {
        match self.receiver.try_recv() {
            Ok(result) => SendPoll::Ready(result),
            Err(TryRecvError::Empty) => SendPoll::Waiting,
            Err(TryRecvError::Disconnected) => SendPoll::Ready(Err(TransportError::Disconnected)),
        }
    }
}

fn run_send(transport: &dyn Transport, request: &DeliveryRequest) -> Result<Ack, TransportError> {
    catch_unwind(AssertUnwindSafe(|| transport.send(request))).unwrap_or_else(|_| {
        Err(TransportError::Request(
            "transport panicked during send".to_string(),
        ))
    })
}
