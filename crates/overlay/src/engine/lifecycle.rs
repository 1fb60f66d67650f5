//! Startup handshake, background tasks, the outer run loop and teardown.

use super::{Engine, Inner, Phase};
use crate::error::{InitError, ServiceError};
use crate::scheduler::ActivityGate;
use core::time::Duration;
use log::{debug, info, warn};
use std::rc::Rc;
use tokio::task::spawn_local;
use tokio::time::{Instant, interval_at, sleep};

impl Inner {
    /// Ping the service with the configured delays until it reports ready.
    async fn ping_until_ready(&self) -> Result<(), ServiceError> {
        let mut last = ServiceError::NotReady;
        for (attempt, delay) in self.config.ping_delays_ms.iter().enumerate() {
            if *delay > 0 {
                sleep(Duration::from_millis(*delay)).await;
            }
            match self.resolver.service().ping().await {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    debug!("ping {attempt}: service not ready");
                    last = ServiceError::NotReady;
                }
                Err(err) => {
                    debug!("ping {attempt} failed: {err}");
                    last = err;
                }
            }
        }
        Err(last)
    }

    /// Connect to the service: ping, then read the dataset size.
    async fn connect(&self) -> Result<usize, ServiceError> {
        self.ping_until_ready().await?;
        self.resolver.service().cards_count().await
    }

    /// Connect with exponential backoff.
    async fn handshake(&self) -> Result<usize, InitError> {
        let attempts = self.config.init_attempts.max(1);
        let mut attempt = 0;
        loop {
            match self.connect().await {
                Ok(count) => return Ok(count),
                Err(source) => {
                    attempt += 1;
                    if attempt >= attempts {
                        return Err(InitError::Connect { attempts, source });
                    }
                    let backoff = self.config.init_backoff(attempt - 1);
                    warn!("connect attempt {attempt} failed ({source}), retrying in {backoff:?}");
                    sleep(backoff).await;
                }
            }
            if self.is_torn_down() {
                return Err(InitError::TornDown);
            }
        }
    }

    fn spawn_background(self: &Rc<Self>) {
        let events = {
            let mut doc = self.doc.borrow_mut();
            let subscription = doc.subscribe();
            let mut state = self.state.borrow_mut();
            state.subscription = Some(subscription.id);
            subscription.events
        };
        let updates = self.resolver.service().subscribe();
        let period = self.config.sweep_interval().max(Duration::from_millis(1));
        let sweeper = Rc::clone(self);
        let handles = [
            spawn_local(Rc::clone(self).event_loop(events)),
            spawn_local(Rc::clone(self).dataset_loop(updates)),
            spawn_local(async move {
                let mut ticks = interval_at(Instant::now() + period, period);
                loop {
                    ticks.tick().await;
                    sweeper.sweep();
                }
            }),
        ];
        self.state.borrow_mut().tasks.listeners.extend(handles);
    }

    /// Drop detached overlays and cards, then enforce the cap.
    pub(super) fn sweep(&self) {
        let mut doc = self.doc.borrow_mut();
        let mut state = self.state.borrow_mut();
        if state.phase != Phase::Running {
            return;
        }
        let report = state.manager.sweep(&mut doc);
        for owner in &report.orphaned {
            state.registry.forget(*owner);
        }
        for owner in &report.evicted {
            state.registry.force_reject(*owner);
        }
        let detached: Vec<_> = state
            .registry
            .nodes()
            .into_iter()
            .filter(|&node| !doc.is_connected(node))
            .collect();
        for node in detached {
            state.forget_card(&mut doc, node);
        }
    }

    fn teardown(&self) {
        let mut doc = self.doc.borrow_mut();
        let mut state = self.state.borrow_mut();
        if state.phase == Phase::TornDown {
            return;
        }
        state.phase = Phase::TornDown;
        state.tasks.abort_all();
        if let Some(id) = state.subscription.take() {
            doc.unsubscribe(id);
        }
        state.clear_cards();
        state.guard.clear();
        state.navigation.reset();
        state.watcher.cancel();
        state.throttle.cancel();
        let removed = state.manager.remove_all(&mut doc);
        self.resolver.clear();
        info!("overlay engine torn down, removed {removed} overlays");
    }
}

impl Engine {
    /// Connect to the data service, attach to the document and run the initial scan.
    ///
    /// Must be called from within a `tokio::task::LocalSet`. Calling it on a running engine
    /// does nothing.
    ///
    /// # Errors
    /// Returns [`InitError`] when the service cannot be reached after all retries, or when
    /// the engine was torn down.
    pub async fn start(&self) -> Result<(), InitError> {
        match self.inner.state.borrow().phase {
            Phase::Running => return Ok(()),
            Phase::TornDown => return Err(InitError::TornDown),
            Phase::Idle => {}
        }
        let count = self.inner.handshake().await?;
        {
            let doc = self.inner.doc.borrow();
            let mut state = self.inner.state.borrow_mut();
            if state.phase != Phase::Idle {
                return if state.phase == Phase::TornDown {
                    Err(InitError::TornDown)
                } else {
                    Ok(())
                };
            }
            state.phase = Phase::Running;
            state.activity = ActivityGate::new(
                self.inner.config.inactivity(),
                Instant::now(),
                doc.is_hidden(),
            );
            info!(
                "overlay engine running on a {} page, dataset holds {count} cards",
                state.context.as_str()
            );
        }
        self.inner.spawn_background();
        if count == 0 {
            info!("dataset is empty, waiting for the first sync before scanning");
        } else {
            self.inner.request_scan();
        }
        Ok(())
    }

    /// Keep trying to start until it succeeds or the engine is torn down.
    pub async fn run(&self) {
        loop {
            match self.start().await {
                Ok(()) | Err(InitError::TornDown) => return,
                Err(err) => {
                    warn!("overlay engine failed to start: {err}");
                    sleep(self.inner.config.run_retry()).await;
                }
            }
        }
    }

    /// Run one sweep immediately.
    pub fn sweep(&self) {
        self.inner.sweep();
    }

    /// Stop every task, detach from the document and remove every overlay. Idempotent.
    pub fn teardown(&self) {
        self.inner.teardown();
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.is_torn_down()
    }
}
