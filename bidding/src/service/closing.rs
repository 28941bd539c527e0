use std::sync::Arc;

use helper::err::IndividualErrorList;
use model::domain::auction::{Auction, AuctionStatus, BidRejection};
use model::domain::bid::{Bid, BidStatus};
use model::view::bid::{CloseOutcome, WinningBid};
use model::view::event::AuctionEvent;
use model::{AuctionId, BidId, UserId};

use crate::repository::clock::Clock;
use crate::repository::outbox::Outbox;
use crate::repository::retry::{with_retry, RetryPolicy};
use crate::repository::store::{AuctionStore, StoreError, StoreTx};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Auction {0} not found")]
    NotFound(AuctionId),
    #[error(transparent)]
    Rejected(#[from] BidRejection),
    #[error("Buy Now not available for this listing")]
    BuyNowUnavailable,
    #[error("Auction {0} is contended, too many conflicting updates")]
    Conflict(AuctionId),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for Error {
    fn from(error: StoreError) -> Self { Error::Store(error) }
}

fn is_transient(error: &Error) -> bool {
    matches!(error, Error::Store(store) if store.is_conflict())
}

fn promote_conflict(error: Error, auction_id: &AuctionId) -> Error {
    match error {
        Error::Store(store) if store.is_conflict() => {
            Error::Conflict(auction_id.clone())
        }
        other => other,
    }
}

/// What one completed sweep did, with per-auction failures kept individual.
#[derive(Debug)]
pub struct SweepReport {
    pub closed: Vec<CloseOutcome>,
    pub errors: IndividualErrorList,
}

/// Drives `Active` auctions into their terminal state: deadline-driven
/// closing, seller cancellation and instant purchase.
pub struct ClosingService {
    store:  Arc<dyn AuctionStore>,
    clock:  Arc<dyn Clock>,
    outbox: Arc<Outbox>,
    retry:  RetryPolicy,
}

impl ClosingService {
    pub fn new(
        store: Arc<dyn AuctionStore>,
        clock: Arc<dyn Clock>,
        outbox: Arc<Outbox>,
        retry: RetryPolicy,
    ) -> Self {
        Self { store, clock, outbox, retry }
    }

    /// Select the winner and end the auction. Re-closing a terminal
    /// auction is a no-op that reports the recorded outcome.
    pub async fn close_auction(
        &self,
        auction_id: &AuctionId,
    ) -> Result<CloseOutcome, Error> {
        trace!("closing auction {}", auction_id);
        let (outcome, events) = with_retry(&self.retry, is_transient, || {
            self.try_close(auction_id)
        })
        .await
        .map_err(|error| promote_conflict(error, auction_id))?;

        for event in events {
            self.outbox.emit(event);
        }
        Ok(outcome)
    }

    async fn try_close(
        &self,
        auction_id: &AuctionId,
    ) -> Result<(CloseOutcome, Vec<AuctionEvent>), Error> {
        let mut tx = self.store.begin().await?;
        let Some(mut auction) = tx.auction_for_update(auction_id).await?
        else {
            tx.rollback().await?;
            return Err(Error::NotFound(auction_id.clone()));
        };

        if auction.status.is_terminal() {
            tx.rollback().await?;
            let winner = recorded_winner(&auction);
            let reserve_met = auction.status == AuctionStatus::Sold;
            return Ok((
                CloseOutcome {
                    auction,
                    winner,
                    reserve_met,
                    already_closed: true,
                },
                Vec::new(),
            ));
        }

        let winning = tx.winning_bid(auction_id).await?;
        let mut winner = None;
        let mut reserve_met = false;
        match &winning {
            Some(bid) if auction.reserve_met(bid.amount) => {
                auction.status = AuctionStatus::Sold;
                auction.winner = Some(bid.bidder.clone());
                auction.final_price = Some(bid.amount);
                tx.update_bid_status(&bid.id, BidStatus::Won).await?;
                reserve_met = true;
                winner = Some(WinningBid {
                    user_id: bid.bidder.clone(),
                    amount:  bid.amount,
                });
            }
            Some(bid) => {
                // a leading bid below the reserve ends the auction without
                // a sale
                debug!(
                    "auction {} leading bid {} below reserve",
                    auction_id, bid.amount
                );
                auction.status = AuctionStatus::Ended;
            }
            None => {
                auction.status = AuctionStatus::Ended;
            }
        }

        tx.deactivate_proxy_bids(auction_id).await?;
        tx.update_auction(auction.clone()).await?;
        tx.commit().await?;

        info!("auction {} closed as {}", auction_id, auction.status);
        let events = vec![AuctionEvent::AuctionEnded {
            auction_id:  auction_id.clone(),
            winner:      auction.winner.clone(),
            final_price: auction.final_price,
            reserve_met,
        }];
        Ok((
            CloseOutcome {
                auction,
                winner,
                reserve_met,
                already_closed: false,
            },
            events,
        ))
    }

    /// Withdraw an `Active` auction without a sale.
    pub async fn cancel_auction(
        &self,
        auction_id: &AuctionId,
    ) -> Result<CloseOutcome, Error> {
        trace!("cancelling auction {}", auction_id);
        let (outcome, events) = with_retry(&self.retry, is_transient, || {
            self.try_cancel(auction_id)
        })
        .await
        .map_err(|error| promote_conflict(error, auction_id))?;

        for event in events {
            self.outbox.emit(event);
        }
        Ok(outcome)
    }

    async fn try_cancel(
        &self,
        auction_id: &AuctionId,
    ) -> Result<(CloseOutcome, Vec<AuctionEvent>), Error> {
        let mut tx = self.store.begin().await?;
        let Some(mut auction) = tx.auction_for_update(auction_id).await?
        else {
            tx.rollback().await?;
            return Err(Error::NotFound(auction_id.clone()));
        };
        if auction.status != AuctionStatus::Active {
            tx.rollback().await?;
            return Err(BidRejection::NotActive {
                status: auction.status,
            }
            .into());
        }

        if let Some(bid) = tx.winning_bid(auction_id).await? {
            tx.update_bid_status(&bid.id, BidStatus::Outbid).await?;
        }
        auction.status = AuctionStatus::Cancelled;
        tx.deactivate_proxy_bids(auction_id).await?;
        tx.update_auction(auction.clone()).await?;
        tx.commit().await?;

        info!("auction {} cancelled", auction_id);
        let events = vec![AuctionEvent::AuctionEnded {
            auction_id:  auction_id.clone(),
            winner:      None,
            final_price: None,
            reserve_met: false,
        }];
        Ok((
            CloseOutcome {
                auction,
                winner: None,
                reserve_met: false,
                already_closed: false,
            },
            events,
        ))
    }

    /// Instant purchase at the listing's buy-now price, ending the auction
    /// on the spot.
    pub async fn buy_now(
        &self,
        auction_id: &AuctionId,
        buyer: &UserId,
    ) -> Result<CloseOutcome, Error> {
        trace!("buy now by {} on auction {}", buyer, auction_id);
        let (outcome, events) = with_retry(&self.retry, is_transient, || {
            self.try_buy_now(auction_id, buyer)
        })
        .await
        .map_err(|error| promote_conflict(error, auction_id))?;

        for event in events {
            self.outbox.emit(event);
        }
        Ok(outcome)
    }

    async fn try_buy_now(
        &self,
        auction_id: &AuctionId,
        buyer: &UserId,
    ) -> Result<(CloseOutcome, Vec<AuctionEvent>), Error> {
        let mut tx = self.store.begin().await?;
        let Some(mut auction) = tx.auction_for_update(auction_id).await?
        else {
            tx.rollback().await?;
            return Err(Error::NotFound(auction_id.clone()));
        };
        if auction.status != AuctionStatus::Active {
            tx.rollback().await?;
            return Err(BidRejection::NotActive {
                status: auction.status,
            }
            .into());
        }
        let Some(price) = auction.buy_now_price else {
            tx.rollback().await?;
            return Err(Error::BuyNowUnavailable);
        };
        if buyer == &auction.seller {
            tx.rollback().await?;
            return Err(BidRejection::SelfBid.into());
        }

        if let Some(prior) = tx.winning_bid(auction_id).await? {
            tx.update_bid_status(&prior.id, BidStatus::Outbid).await?;
        }
        let bid = Bid {
            id:         BidId::generate(),
            auction:    auction_id.clone(),
            bidder:     buyer.clone(),
            amount:     price,
            status:     BidStatus::Won,
            created_at: self.clock.now(),
        };
        tx.insert_bid(bid.clone()).await?;

        auction.status = AuctionStatus::Sold;
        auction.current_price = price;
        auction.winner = Some(buyer.clone());
        auction.final_price = Some(price);
        auction.bid_count += 1;
        tx.deactivate_proxy_bids(auction_id).await?;
        tx.update_auction(auction.clone()).await?;
        tx.commit().await?;

        info!("auction {} bought now by {}", auction_id, buyer);
        let events = vec![
            AuctionEvent::BidPlaced {
                auction_id:    auction_id.clone(),
                bid,
                current_price: price,
            },
            AuctionEvent::AuctionEnded {
                auction_id:  auction_id.clone(),
                winner:      Some(buyer.clone()),
                final_price: Some(price),
                reserve_met: true,
            },
        ];
        Ok((
            CloseOutcome {
                auction,
                winner: Some(WinningBid {
                    user_id: buyer.clone(),
                    amount:  price,
                }),
                reserve_met: true,
                already_closed: false,
            },
            events,
        ))
    }

    /// Close every `Active` auction whose deadline has passed. One
    /// auction's failure never aborts the rest; this carries no timer and
    /// is meant to be driven by an external scheduler.
    pub async fn sweep_expired(&self) -> Result<SweepReport, Error> {
        let now = self.clock.now();
        let due = self.store.expired_active_auctions(now).await?;
        debug!("sweeping {} expired auctions", due.len());

        let mut closed = Vec::new();
        let mut errors = IndividualErrorList::new();
        for auction_id in due {
            match self.close_auction(&auction_id).await {
                Ok(outcome) => closed.push(outcome),
                Err(error) => {
                    warn!(
                        "failed to close expired auction {}: {}",
                        auction_id, error
                    );
                    errors.push(anyhow::Error::new(error).context(
                        format!("closing expired auction {}", auction_id),
                    ));
                }
            }
        }
        if !errors.is_empty() {
            warn!("sweep finished with {} failures: {}", errors.len(), errors);
        }
        Ok(SweepReport { closed, errors })
    }
}

fn recorded_winner(auction: &Auction) -> Option<WinningBid> {
    match (&auction.winner, auction.final_price) {
        (Some(user), Some(amount)) => {
            Some(WinningBid { user_id: user.clone(), amount })
        }
        _ => None,
    }
}
