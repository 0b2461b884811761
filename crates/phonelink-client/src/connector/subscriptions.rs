//! Periodic subscriptions and event callbacks
//!
//! ## Blocking subscriptions
//!
//! [`Connector::subscribe`] runs on the caller's task. While it runs,
//! inbound events still update history and the mirror immediately, but
//! their callbacks are queued and dispatched by the loop itself, oldest
//! timestamp first:
//!
//! ```text
//! tick ─▶ callback(frame) ─▶ drain ─▶ sleep rest of interval ─▶ drain ─▶ tick
//! ```
//!
//! ## Background jobs
//!
//! [`Connector::subscribe_async`] spawns a task ticking on its own. Its
//! callbacks may run concurrently with inbound dispatch.

use std::str::FromStr;
use std::sync::Weak;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use phonelink_core::prelude::*;

use super::{Connector, Inner};
use crate::dispatch::{invoke_contained, CanonicalEvent, Event, Handler, SubscriptionId};
use crate::protocol::Delivery;
use crate::scheduler::{DataFrame, JobHandle, JobMode};

/// Releases the blocking slot when a blocking loop ends, however it ends.
struct BlockingGuard<'a> {
    connector: &'a Connector,
    job: JobHandle,
}

impl Drop for BlockingGuard<'_> {
    fn drop(&mut self) {
        self.job.stop();
        let remaining = {
            let mut state = self.connector.state();
            state.blocking = None;
            state.take_deferred()
        };
        for event in &remaining {
            self.connector.dispatch(event);
        }
        self.connector.jobs().remove(self.job.id());
        debug!("Blocking {} finished", self.job.id());
    }
}

impl Connector {
    // ─────────────────────────────────────────────────────────────
    // Scheduling
    // ─────────────────────────────────────────────────────────────

    /// Call `handler` every `interval` with our current frame until the job
    /// is stopped (via [`DataFrame::stop`], [`Self::cancel_subscription`] or
    /// [`Self::disconnect`]).
    ///
    /// Only one blocking subscription may run at a time.
    pub async fn subscribe(&self, handler: Handler<DataFrame>, interval: Duration) -> Result<()> {
        let interval = self.settings().scheduler.clamp(interval);
        let job = {
            let mut state = self.state();
            if state.blocking.is_some() {
                return Err(Error::AlreadyBlocking);
            }
            let job = self.jobs().create(JobMode::Blocking);
            state.blocking = Some(job.id());
            job
        };
        let guard = BlockingGuard {
            connector: self,
            job: job.clone(),
        };
        job.start();
        info!("Blocking {} every {:?}", job.id(), interval);

        while !job.is_cancelled() {
            let tick = Instant::now();
            let frame = DataFrame::new(self.current_frame(), Some(job.clone()));
            invoke_contained(&handler, "subscription", &frame, self);
            self.drain_deferred();

            let elapsed = tick.elapsed();
            if elapsed < interval {
                tokio::select! {
                    () = tokio::time::sleep(interval - elapsed) => {}
                    () = job.stopped() => {}
                }
            } else {
                // Overran the interval: still let ingestion and other tasks run.
                tokio::task::yield_now().await;
            }
            self.drain_deferred();
        }

        drop(guard);
        Ok(())
    }

    /// Run `handler` every `interval` in a background task, `iterations`
    /// times or until stopped. The first call comes after one interval.
    pub fn subscribe_async(
        &self,
        handler: Handler<DataFrame>,
        interval: Duration,
        iterations: Option<u64>,
    ) -> JobHandle {
        let interval = self.settings().scheduler.clamp(interval);
        let job = self.jobs().create(JobMode::Background);
        debug!("Background {} every {:?}", job.id(), interval);

        tokio::spawn(run_background(
            self.downgrade(),
            self.delivery.clone(),
            handler,
            job.clone(),
            interval,
            iterations,
        ));
        job
    }

    /// Run `handler` once after `delay`.
    pub fn set_timeout(&self, handler: Handler<DataFrame>, delay: Duration) -> JobHandle {
        self.subscribe_async(handler, delay, Some(1))
    }

    /// Stop the most recently started subscription. Returns `false` when
    /// none is running.
    pub fn cancel_subscription(&self) -> bool {
        match self.jobs().latest() {
            Some(job) => {
                job.stop();
                self.jobs().remove(job.id());
                true
            }
            None => false,
        }
    }

    /// Stop every subscription. Returns how many were running.
    pub fn cancel_all_jobs(&self) -> usize {
        self.jobs().cancel_all()
    }

    fn drain_deferred(&self) {
        let events = self.state().take_deferred();
        for event in &events {
            self.dispatch(event);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Callbacks
    // ─────────────────────────────────────────────────────────────

    /// Set the single callback slot of `event`.
    pub fn set_callback(&self, event: CanonicalEvent, handler: Handler<Event>) {
        self.callbacks().set_slot(event, handler);
    }

    pub fn clear_callback(&self, event: CanonicalEvent) {
        self.callbacks().clear_slot(event);
    }

    /// [`Self::set_callback`] by event name or alias.
    pub fn on(&self, name: &str, handler: Handler<Event>) -> Result<()> {
        let event = CanonicalEvent::from_str(name)?;
        self.set_callback(event, handler);
        Ok(())
    }

    /// Add a subscriber for `name` (or alias). With `replace`, earlier
    /// subscribers of that event are dropped first.
    pub fn register(
        &self,
        name: &str,
        handler: Handler<Event>,
        replace: bool,
    ) -> Result<SubscriptionId> {
        let event = CanonicalEvent::from_str(name)?;
        Ok(self.callbacks().register(event, handler, replace))
    }

    /// Remove one subscriber of `name`, or all of them when `id` is `None`.
    pub fn unregister(&self, name: &str, id: Option<SubscriptionId>) -> Result<usize> {
        let event = CanonicalEvent::from_str(name)?;
        Ok(self.callbacks().unregister(event, id))
    }
}

async fn run_background(
    weak: Weak<Inner>,
    delivery: Delivery,
    handler: Handler<DataFrame>,
    job: JobHandle,
    interval: Duration,
    iterations: Option<u64>,
) {
    if !job.start() {
        return;
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut fired: u64 = 0;

    while iterations.map_or(true, |n| fired < n) {
        tokio::select! {
            _ = ticker.tick() => {}
            () = job.stopped() => break,
        }
        if job.is_cancelled() {
            break;
        }
        let Some(connector) = Connector::upgrade(&weak) else {
            break;
        };
        let connector = connector.addressed(delivery.clone());
        let frame = DataFrame::new(connector.current_frame(), Some(job.clone()));
        invoke_contained(&handler, "background job", &frame, &connector);
        fired += 1;
    }

    job.stop();
    if let Some(connector) = Connector::upgrade(&weak) {
        connector.jobs().remove(job.id());
    }
    trace!("Background {} done after {} call(s)", job.id(), fired);
}
