//! One-shot reply channel back to the client

use tokio::sync::oneshot;
use tracing::debug;

/// Sends the single response of one request. Consumed by [`Responder::send`],
/// so a handler cannot reply twice.
pub struct Responder<T> {
    op: &'static str,
    deliver: Box<dyn FnOnce(T) + Send>,
}

impl<T: Send + 'static> Responder<T> {
    pub fn new(op: &'static str, deliver: impl FnOnce(T) + Send + 'static) -> Self {
        Self {
            op,
            deliver: Box::new(deliver),
        }
    }

    /// Responder paired with the receiver its response arrives on
    #[must_use]
    pub fn channel(op: &'static str) -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let responder = Self::new(op, move |response| {
            if tx.send(response).is_err() {
                debug!("{}: requester went away before the response", op);
            }
        });
        (responder, rx)
    }

    pub fn send(self, response: T) {
        debug!("{}: sending response", self.op);
        (self.deliver)(response);
    }
}
