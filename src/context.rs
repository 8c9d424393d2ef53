//! Shared handles for one run

use crate::fetch::transport::{HttpTransport, ReqwestTransport};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything the components of one run share: the HTTP transport and the
/// process-wide cancellation signal.
#[derive(Clone)]
pub struct RunContext {
    transport: Arc<dyn HttpTransport>,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(transport: Arc<dyn HttpTransport>, cancel: CancellationToken) -> Self {
        Self { transport, cancel }
    }

    /// Context backed by the reqwest transport and a fresh token
    pub fn with_defaults() -> crate::Result<Self> {
        Ok(Self::new(
            Arc::new(ReqwestTransport::new()?),
            CancellationToken::new(),
        ))
    }

    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        Arc::clone(&self.transport)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the run when the process receives Ctrl-C
    pub fn cancel_on_ctrl_c(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, finishing in-flight work");
                cancel.cancel();
            }
        });
    }
}
