// src/events_writer.rs
// UI Event Writer (C6, §4.6). Forwards `UiEvent`s from the Reasoning Loop
// onto an SSE-bound channel. A silent sink: a dropped receiver (client
// disconnected, TCP write failed upstream) never fails the loop — history
// keeps being appended so the conversation can be resumed later (§4.6).

use tokio::sync::mpsc;

use crate::protocol::UiEvent;

/// Thin wrapper over the channel half that feeds the SSE response body.
/// The HTTP layer owns the paired receiver and turns it into an
/// `axum::response::sse::Sse` stream, appending the literal `[DONE]`
/// frame once the sender side is dropped.
#[derive(Clone)]
pub struct UiEventWriter {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl UiEventWriter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Never surfaces a failure to the caller; a closed receiver just means
    /// the client went away mid-turn.
    pub fn send(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_after_receiver_dropped_does_not_panic() {
        let (writer, rx) = UiEventWriter::new();
        drop(rx);
        writer.send(UiEvent::Start);
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (writer, mut rx) = UiEventWriter::new();
        writer.send(UiEvent::Start);
        writer.send(UiEvent::TextDelta { delta: "hi".into() });
        writer.send(UiEvent::Finish);
        assert!(matches!(rx.recv().await, Some(UiEvent::Start)));
        assert!(matches!(rx.recv().await, Some(UiEvent::TextDelta { .. })));
        assert!(matches!(rx.recv().await, Some(UiEvent::Finish)));
    }
}
