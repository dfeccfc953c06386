use std::{pin::Pin, time::Duration};

use futures_util::future;
use tokio::time::Sleep;

use super::state::TimerId;

/// The only pending timer of a driver, arming a new one drops(cancels) the old one.
#[derive(Debug, Default)]
pub(crate) struct Timer {
    pending: Option<(TimerId, Pin<Box<Sleep>>)>,
}

impl Timer {
    pub fn arm(&mut self, id: TimerId, delay: Duration) {
        log::trace!("Timer {} will fire in {:?}", id, delay);
        self.pending
            .replace((id, Box::pin(tokio::time::sleep(delay))));
    }

    pub fn cancel(&mut self) {
        if let Some((id, _)) = self.pending.take() {
            log::trace!("Timer {} cancelled", id);
        }
    }

    /// Wait until pending timer fires, never resolves when nothing pending.
    ///
    /// Cancel safe, the sleep is kept when this future is dropped.
    pub async fn fired(&mut self) -> TimerId {
        let id = match self.pending {
            Some((id, ref mut sleep)) => {
                sleep.as_mut().await;
                id
            }
            None => future::pending().await,
        };

        self.pending = None;
        id
    }
}
