use crate::error::{RallyError, Result};
use crate::locality::Locality;
use crate::payload;
use crate::protocol::RallyMessage;
use crate::rpc::{RpcHandler, SHUTDOWN, rpc_handler};
use crate::types::{Priority, Site};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Lifecycle phase of a locality.
///
/// `Running → Draining → Aborting → Stopped`; `Aborting` is skipped when
/// every in-flight request finishes within the drain budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalityState {
    Running,
    /// Hooks have run and new remote requests are refused; in-flight
    /// requests are given until the deadline to finish.
    Draining,
    /// The deadline passed; the remaining requests are being aborted.
    Aborting,
    Stopped,
}

impl Locality {
    pub fn state(&self) -> LocalityState {
        *self.state.borrow()
    }

    /// Resolves once the locality has reached `Stopped`.
    pub async fn stopped(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == LocalityState::Stopped).await;
    }

    /// Run `hook` when shutdown starts, before requests are drained.
    pub fn on_shutdown(&self, hook: impl FnOnce() + Send + 'static) {
        if let Ok(mut hooks) = self.shutdown_hooks.lock() {
            hooks.push(Box::new(hook));
        }
    }

    /// Shut this locality down, draining in-flight requests for at most
    /// `timeout` before aborting them.
    ///
    /// Concurrent and repeated calls wait for the first one to finish.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        let started = self.state.send_if_modified(|state| {
            if *state == LocalityState::Running {
                *state = LocalityState::Draining;
                true
            } else {
                false
            }
        });
        if !started {
            self.stopped().await;
            return Ok(());
        }
        tracing::info!(site = self.site, timeout_ms = timeout.as_millis() as u64, "shutdown: draining");

        let hooks = self
            .shutdown_hooks
            .lock()
            .map(|mut hooks| std::mem::take(&mut *hooks))
            .unwrap_or_default();
        for hook in hooks {
            hook();
        }

        self.inflight.stop_accepting();
        let mut tasks = self.inflight.take_all()?;
        let drained = tokio::time::timeout(timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        if !drained {
            self.state.send_replace(LocalityState::Aborting);
            tracing::warn!(site = self.site, remaining = tasks.len(), "shutdown: aborting in-flight requests");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        let goodbye = RallyMessage::Goodbye { site: self.site };
        let farewells = self
            .peers
            .values()
            .map(|peer| peer.send_message(&goodbye, Priority::Critical));
        for result in futures::future::join_all(farewells).await {
            if let Err(e) = result {
                tracing::debug!(site = self.site, "shutdown: goodbye not delivered: {e}");
            }
        }

        self.close();
        self.abort_background();
        self.state.send_replace(LocalityState::Stopped);
        tracing::info!(site = self.site, "shutdown: stopped");
        Ok(())
    }

    /// Ask every other locality to shut down, then shut down this one.
    ///
    /// Failures to reach a peer are logged; they do not stop the local
    /// shutdown.
    pub async fn shutdown_all(&self, timeout: Duration) -> Result<()> {
        let request = payload::to_bytes(&(timeout.as_millis() as u64));
        let calls = self.peers.keys().map(|&site| {
            let request = request.clone();
            async move { (site, self.invoke(site, SHUTDOWN, request).await) }
        });
        for (site, result) in futures::future::join_all(calls).await {
            if let Err(e) = result {
                tracing::warn!(site = self.site, peer = site, "shutdown_all: request failed: {e}");
            }
        }
        self.shutdown(timeout).await
    }

    /// `shutdown_all` with the drain budget from `RallyConfig::shutdown_timeout`.
    pub async fn shutdown_cluster(&self) -> Result<()> {
        self.shutdown_all(self.config.shutdown_timeout).await
    }
}

/// Handler of the `SHUTDOWN` action: start a shutdown in the background and
/// acknowledge right away.
pub(super) fn shutdown_handler(locality: Weak<Locality>, site: Site) -> RpcHandler {
    rpc_handler(move |request| {
        let locality = locality.clone();
        async move {
            let locality: Arc<Locality> = locality
                .upgrade()
                .ok_or(RallyError::ShuttingDown { site })?;
            let timeout = Duration::from_millis(payload::from_bytes::<u64>(&request)?);
            tracing::info!(site, "shutdown requested by a peer");
            tokio::spawn(async move {
                if let Err(e) = locality.shutdown(timeout).await {
                    tracing::warn!(site = locality.site(), "shutdown failed: {e}");
                }
            });
            Ok(Vec::new())
        }
    })
}
