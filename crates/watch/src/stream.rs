//! Bus subscription → transport frame stream.
//!
//! Adapts a live bus subscription into an async stream of wire chunks
//! for a long-lived push connection: the connected frame first, then one
//! frame per matching emission, with heartbeats on an interval. Dropping
//! the stream — a client disconnect, however it races an in-flight
//! emission — runs cleanup exactly once: the RAII subscription guard
//! unsubscribes and the heartbeat timer dies with the generator.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::Stream;

use beads_live_core::ProjectIdentity;

use crate::bus::{ActivityBus, ChangeBus};
use crate::frame::{Frame, CONNECTED_FRAME, HEARTBEAT_FRAME};

/// Stream of wire chunks for the change bus.
pub fn change_frames(
    bus: &ChangeBus,
    scope: Option<ProjectIdentity>,
    heartbeat: Duration,
) -> impl Stream<Item = String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = bus.subscribe(scope, move |event| {
        let _ = tx.send(Frame::from_change(event));
    });
    frames_to_wire(subscription, rx, heartbeat)
}

/// Stream of wire chunks for the activity bus.
pub fn activity_frames(
    bus: &ActivityBus,
    scope: Option<ProjectIdentity>,
    heartbeat: Duration,
) -> impl Stream<Item = String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = bus.subscribe(scope, move |event| {
        let _ = tx.send(Frame::from_activity(event));
    });
    frames_to_wire(subscription, rx, heartbeat)
}

fn frames_to_wire<G: Send + 'static>(
    subscription: G,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    heartbeat: Duration,
) -> impl Stream<Item = String> {
    async_stream::stream! {
        // Held for the life of the stream; dropped (and unsubscribed)
        // exactly once when the generator is dropped.
        let _subscription = subscription;

        yield CONNECTED_FRAME.to_string();

        let mut heartbeat_interval = tokio::time::interval(heartbeat);
        heartbeat_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of an interval fires immediately; swallow it so
        // the connected frame is not chased by an instant heartbeat.
        heartbeat_interval.tick().await;

        loop {
            tokio::select! {
                frame = rx.recv() => {
                    match frame {
                        Some(frame) => yield frame.to_wire(),
                        None => break,
                    }
                }
                _ = heartbeat_interval.tick() => {
                    yield HEARTBEAT_FRAME.to_string();
                }
            }
        }
    }
}
