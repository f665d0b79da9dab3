//! Drive a `DosingController` from a clock, a reading source and a relay.
//!
//! Two entry points:
//! - [`run`]: live polling loop. Samples on a fixed period, wakes early for
//!   pulse deadlines and releases every relay on shutdown.
//! - [`replay`]: feeds timestamped observations (for example a recorded
//!   JSONL log) with time taken from the observations themselves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use hydro_traits::{Clock, Relay};

use crate::controller::DosingController;
use crate::error::Result;
use crate::status::{Decision, SkipReason};
use crate::types::{DosingEvent, Observation};

/// Loop pacing for [`run`].
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Period between reading batches.
    pub poll: Duration,
    /// Stop after this many batches (None: until shutdown or source exhaustion).
    pub max_ticks: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            poll: Duration::from_secs(2),
            max_ticks: None,
        }
    }
}

/// Counters reported when a run ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub observations: u64,
    pub rejected: u64,
    pub activations: u64,
    pub deactivations: u64,
    pub relay_errors: u64,
}

impl RunSummary {
    fn record(&mut self, decision: &Decision) {
        self.observations += 1;
        if let Decision::Skipped(SkipReason::Rejected(_)) = decision {
            self.rejected += 1;
        }
    }
}

/// Forward relay events in order. Failures are logged and counted; the
/// controller's state is not rolled back and delivery is not retried.
pub fn dispatch<R: Relay + ?Sized>(events: &[DosingEvent], relay: &mut R, summary: &mut RunSummary) {
    for ev in events {
        let on = ev.action.is_on();
        if on {
            summary.activations += 1;
        } else {
            summary.deactivations += 1;
        }
        match relay.set(ev.relay_channel, on) {
            Ok(()) => tracing::info!(
                channel = %ev.channel,
                relay = ev.relay_channel,
                on,
                at_ms = ev.at_ms,
                "relay set"
            ),
            Err(e) => {
                summary.relay_errors += 1;
                tracing::warn!(
                    channel = %ev.channel,
                    relay = ev.relay_channel,
                    on,
                    error = %e,
                    "relay command failed"
                );
            }
        }
    }
}

/// Live loop. `source(now_ms)` returns the batch of observations for this
/// tick, or `None` once it has nothing more to give.
///
/// On exit (shutdown flag, tick limit, exhausted source or source error)
/// every pending pulse is cancelled and its Deactivate delivered.
pub fn run<C, R, F>(
    controller: &mut DosingController,
    clock: &C,
    relay: &mut R,
    mut source: F,
    opts: RunOptions,
    shutdown: &AtomicBool,
) -> Result<RunSummary>
where
    C: Clock + ?Sized,
    R: Relay + ?Sized,
    F: FnMut(u64) -> Result<Option<Vec<Observation>>>,
{
    let epoch = clock.now();
    let poll_ms = u64::try_from(opts.poll.as_millis()).unwrap_or(u64::MAX).max(1);
    let mut summary = RunSummary::default();
    let mut next_sample_ms = 0u64;

    tracing::info!(poll_ms, max_ticks = ?opts.max_ticks, "controller loop start");

    let outcome = loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("shutdown requested");
            break Ok(());
        }
        let now = clock.ms_since(epoch);

        let due = controller.poll(now);
        dispatch(&due, relay, &mut summary);

        if now >= next_sample_ms {
            if opts.max_ticks.is_some_and(|m| summary.ticks >= m) {
                break Ok(());
            }
            let batch = match source(now) {
                Ok(Some(batch)) => batch,
                Ok(None) => {
                    tracing::info!("reading source exhausted");
                    break Ok(());
                }
                Err(e) => break Err(e),
            };
            for obs in &batch {
                let decision = controller.observe(obs);
                summary.record(&decision);
                dispatch(decision.events(), relay, &mut summary);
            }
            summary.ticks += 1;
            next_sample_ms = now.saturating_add(poll_ms);
        }

        let wake_ms = controller
            .next_deadline_ms()
            .map_or(next_sample_ms, |d| d.min(next_sample_ms));
        clock.sleep_until_ms(epoch, wake_ms.max(now.saturating_add(1)));
    };

    let now = clock.ms_since(epoch);
    let released = controller.reset_all(now);
    dispatch(&released, relay, &mut summary);
    tracing::info!(
        ticks = summary.ticks,
        activations = summary.activations,
        deactivations = summary.deactivations,
        relay_errors = summary.relay_errors,
        "controller loop stop"
    );
    outcome.map(|()| summary)
}

/// Feed timestamped observations in order. Pulse auto-offs due before each
/// observation are emitted first; at the end, pulses still in flight run to
/// their deadline.
pub fn replay<R, I>(controller: &mut DosingController, relay: &mut R, observations: I) -> RunSummary
where
    R: Relay + ?Sized,
    I: IntoIterator<Item = Observation>,
{
    replay_with(controller, relay, observations, |_| {})
}

/// [`replay`], also handing every emitted event to `on_event` after it has
/// been dispatched.
pub fn replay_with<R, I, E>(
    controller: &mut DosingController,
    relay: &mut R,
    observations: I,
    mut on_event: E,
) -> RunSummary
where
    R: Relay + ?Sized,
    I: IntoIterator<Item = Observation>,
    E: FnMut(&DosingEvent),
{
    let mut summary = RunSummary::default();
    let mut forward = |events: &[DosingEvent], summary: &mut RunSummary| {
        dispatch(events, relay, summary);
        events.iter().for_each(&mut on_event);
    };
    for obs in observations {
        let due = controller.poll(obs.at_ms);
        forward(&due, &mut summary);
        let decision = controller.observe(&obs);
        summary.record(&decision);
        forward(decision.events(), &mut summary);
        summary.ticks += 1;
    }
    while let Some(deadline) = controller.next_deadline_ms() {
        let due = controller.poll(deadline);
        forward(&due, &mut summary);
    }
    summary
}
