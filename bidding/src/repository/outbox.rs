use model::view::event::AuctionEvent;
use tokio::sync::mpsc;

/// Hands committed domain events to the broadcast collaborator over a
/// channel owned by the caller. The engine never talks to a transport.
pub struct Outbox {
    events: mpsc::UnboundedSender<AuctionEvent>,
}

impl Outbox {
    pub fn new(events: mpsc::UnboundedSender<AuctionEvent>) -> Self {
        Self { events }
    }

    /// Outbox plus the receiving half for the caller to drain.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AuctionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    /// Events are advisory; a caller that dropped its receiver loses them
    /// without failing the operation that produced them.
    pub fn emit(&self, event: AuctionEvent) {
        trace!("emitting {:?}", event);
        if self.events.send(event).is_err() {
            warn!("event receiver closed, broadcast event dropped");
        }
    }
}
