//! Bounded hand-off from the notification callback to the consumer.
//!
//! The transport pushes raw frames into [`EventRelay::dispatch`]; the
//! consumer pulls decoded [`CubeEvent`]s from [`EventStream`] at its own pace.
//! When the consumer falls behind, new events are dropped rather than queued:
//! the notification source is never blocked and memory stays bounded by the
//! channel capacity.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::DecodeError;
use crate::parse::decode_id_notification;
use crate::types::CubeEvent;

/// Create a relay and its consumer stream with room for `capacity` events.
///
/// A `capacity` of zero is raised to one.
pub fn channel(capacity: usize) -> (EventRelay, EventStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventRelay { tx }, EventStream { rx })
}

/// What [`EventRelay::dispatch`] did with a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Decoded and queued for the consumer.
    Delivered(CubeEvent),
    /// Decoded, but the queue was full and the event was discarded.
    Dropped(CubeEvent),
    /// Decoded, but the consumer stream no longer exists.
    Closed(CubeEvent),
    /// Not a valid frame; logged and skipped.
    Malformed(DecodeError),
}

/// Producer side: decodes frames and feeds the consumer queue.
#[derive(Clone, Debug)]
pub struct EventRelay {
    tx: mpsc::Sender<CubeEvent>,
}

impl EventRelay {
    /// Decode `frame` and try to queue the resulting event without blocking.
    ///
    /// A malformed frame is reported through the log and does not affect
    /// later frames.
    pub fn dispatch(&self, frame: &[u8]) -> Dispatch {
        let event = match decode_id_notification(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping ID notification: {e} | raw: {frame:02x?}");
                return Dispatch::Malformed(e);
            }
        };

        match self.tx.try_send(event) {
            Ok(()) => Dispatch::Delivered(event),
            Err(TrySendError::Full(event)) => {
                debug!("Event queue full, dropping {event:?}");
                Dispatch::Dropped(event)
            }
            Err(TrySendError::Closed(event)) => Dispatch::Closed(event),
        }
    }

    /// `true` once the consumer stream has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side: a live stream of decoded events.
///
/// Yields `None` once every [`EventRelay`] feeding it has been dropped, which
/// happens when the underlying link closes.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<CubeEvent>,
}

impl EventStream {
    /// Wait for the next event, or `None` when the stream has ended.
    pub async fn recv(&mut self) -> Option<CubeEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<CubeEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = CubeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::types::StandardId;

    fn standard_id_frame(value: u8) -> [u8; 7] {
        [0x02, value, 0, 0, 0, 0, 0]
    }

    fn standard_id(value: u32) -> CubeEvent {
        CubeEvent::StandardId(StandardId { value, angle: 0 })
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (relay, mut events) = channel(1);

        assert_eq!(
            relay.dispatch(&standard_id_frame(1)),
            Dispatch::Delivered(standard_id(1))
        );
        assert_eq!(
            relay.dispatch(&standard_id_frame(2)),
            Dispatch::Dropped(standard_id(2))
        );

        assert_eq!(events.recv().await, Some(standard_id(1)));
        assert_eq!(events.try_recv(), None);

        // Space again after the consumer caught up.
        assert_eq!(
            relay.dispatch(&standard_id_frame(3)),
            Dispatch::Delivered(standard_id(3))
        );
        assert_eq!(events.recv().await, Some(standard_id(3)));
    }

    #[tokio::test]
    async fn test_zero_capacity_holds_one_event() {
        let (relay, mut events) = channel(0);

        assert_eq!(
            relay.dispatch(&standard_id_frame(1)),
            Dispatch::Delivered(standard_id(1))
        );
        assert_eq!(
            relay.dispatch(&standard_id_frame(2)),
            Dispatch::Dropped(standard_id(2))
        );
        assert_eq!(events.recv().await, Some(standard_id(1)));
    }

    #[tokio::test]
    async fn test_malformed_frame_does_not_break_stream() {
        let (relay, mut events) = channel(8);

        relay.dispatch(&standard_id_frame(1));
        assert_eq!(
            relay.dispatch(&[0x01, 0x00]),
            Dispatch::Malformed(DecodeError::TruncatedFrame {
                expected: 13,
                actual: 2
            })
        );
        relay.dispatch(&standard_id_frame(2));
        drop(relay);

        let received: Vec<CubeEvent> = (&mut events).collect().await;
        assert_eq!(received, vec![standard_id(1), standard_id(2)]);
    }

    #[tokio::test]
    async fn test_stream_ends_when_relay_dropped() {
        let (relay, mut events) = channel(4);
        relay.dispatch(&[0x03]);
        drop(relay);

        assert_eq!(events.next().await, Some(CubeEvent::PositionIdMissed));
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn test_dispatch_after_consumer_gone() {
        let (relay, events) = channel(4);
        drop(events);
        assert!(relay.is_closed());
        assert_eq!(
            relay.dispatch(&[0x04]),
            Dispatch::Closed(CubeEvent::StandardIdMissed)
        );
    }

    #[tokio::test]
    async fn test_events_keep_arrival_order() {
        let (relay, mut events) = channel(16);
        for value in 0..10u8 {
            relay.dispatch(&standard_id_frame(value));
        }
        drop(relay);

        let values: Vec<u32> = (&mut events)
            .filter_map(|e| async move {
                match e {
                    CubeEvent::StandardId(id) => Some(id.value),
                    _ => None,
                }
            })
            .collect()
            .await;
        assert_eq!(values, (0..10).collect::<Vec<u32>>());
    }
}
