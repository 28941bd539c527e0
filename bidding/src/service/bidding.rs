use std::cmp::Ordering;
use std::sync::Arc;

use model::domain::amount::Amount;
use model::domain::auction::{AuctionStatus, BidRejection};
use model::domain::bid::{Bid, BidStatus, Extension, ProxyBid};
use model::view::bid::{BidPlacement, ExtensionInfo};
use model::view::event::AuctionEvent;
use model::{AuctionId, BidId, ProxyBidId, UserId};

use crate::repository::clock::Clock;
use crate::repository::outbox::Outbox;
use crate::repository::retry::{with_retry, RetryPolicy};
use crate::repository::store::{AuctionStore, StoreError, StoreTx};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Auction {0} not found")]
    NotFound(AuctionId),
    #[error("Bid amount must be a positive, finite number")]
    InvalidInput,
    #[error(transparent)]
    Rejected(#[from] BidRejection),
    #[error("Proxy bid maximum must be higher than the current price")]
    ProxyRejected,
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

/// Accepts bids and standing proxy maxima. Every mutation is one
/// serializable transaction; transient conflicts retry per the policy.
pub struct BiddingService {
    store:  Arc<dyn AuctionStore>,
    clock:  Arc<dyn Clock>,
    outbox: Arc<Outbox>,
    retry:  RetryPolicy,
}

impl BiddingService {
    pub fn new(
        store: Arc<dyn AuctionStore>,
        clock: Arc<dyn Clock>,
        outbox: Arc<Outbox>,
        retry: RetryPolicy,
    ) -> Self {
        Self { store, clock, outbox, retry }
    }

    /// Record `amount` from `bidder` as the new leading bid.
    pub async fn place_bid(
        &self,
        auction_id: &AuctionId,
        bidder: &UserId,
        amount: f64,
    ) -> Result<BidPlacement, Error> {
        trace!("bid of {} by {} on auction {}", amount, bidder, auction_id);
        let amount = Amount::try_new(amount)
            .map_err(|_| Error::InvalidInput)?
            .into_inner();

        let (placement, events) = with_retry(&self.retry, is_transient, || {
            self.try_place_bid(auction_id, bidder, amount)
        })
        .await
        .map_err(|error| promote_conflict(error, auction_id))?;

        for event in events {
            self.outbox.emit(event);
        }
        Ok(placement)
    }

    async fn try_place_bid(
        &self,
        auction_id: &AuctionId,
        bidder: &UserId,
        amount: f64,
    ) -> Result<(BidPlacement, Vec<AuctionEvent>), Error> {
        let mut tx = self.store.begin().await?;
        let Some(mut auction) = tx.auction_for_update(auction_id).await?
        else {
            tx.rollback().await?;
            return Err(Error::NotFound(auction_id.clone()));
        };

        // one clock read serves both the legality check and the extension
        // decision
        let now = self.clock.now();
        if let Err(rejection) = auction.validate_bid(bidder, amount, now) {
            tx.rollback().await?;
            return Err(rejection.into());
        }
        let granted = auction.extension_after(now);
        let prior = tx.winning_bid(auction_id).await?;

        let bid = Bid {
            id:         BidId::generate(),
            auction:    auction_id.clone(),
            bidder:     bidder.clone(),
            amount,
            status:     BidStatus::Winning,
            created_at: now,
        };
        tx.insert_bid(bid.clone()).await?;

        let mut outbid_users = Vec::new();
        if let Some(prior) = &prior {
            tx.update_bid_status(&prior.id, BidStatus::Outbid).await?;
            outbid_users.push(prior.bidder.clone());
        }

        let mut extension = None;
        if let Some(granted) = &granted {
            tx.insert_extension(Extension {
                auction:           auction_id.clone(),
                previous_deadline: granted.previous_deadline,
                new_deadline:      granted.new_deadline,
                extension_number:  granted.extension_number,
                triggering_bid:    bid.id.clone(),
            })
            .await?;
            auction.deadline = granted.new_deadline;
            auction.extension_count = granted.extension_number;
            extension = Some(ExtensionInfo {
                previous_deadline: granted.previous_deadline,
                new_deadline:      granted.new_deadline,
                extension_number:  granted.extension_number,
            });
        }

        auction.current_price = amount;
        auction.bid_count += 1;
        tx.update_auction(auction.clone()).await?;
        tx.commit().await?;

        debug!(
            "bid {} of {} now leads auction {}",
            bid.id, amount, auction_id
        );

        let mut events = vec![AuctionEvent::BidPlaced {
            auction_id:    auction_id.clone(),
            bid:           bid.clone(),
            current_price: amount,
        }];
        for outbid in &outbid_users {
            events.push(AuctionEvent::BidOutbid {
                auction_id:  auction_id.clone(),
                bidder:      outbid.clone(),
                new_highest: amount,
            });
        }
        if let Some(info) = &extension {
            events.push(AuctionEvent::AuctionExtended {
                auction_id:        auction_id.clone(),
                previous_deadline: info.previous_deadline,
                new_deadline:      info.new_deadline,
                extension_number:  info.extension_number,
            });
        }

        let placement = BidPlacement {
            bid,
            auction,
            was_extended: extension.is_some(),
            extension,
            outbid_users,
        };
        Ok((placement, events))
    }

    /// Let standing proxy maxima answer the new leading bid. Each proxy
    /// responds at most once per resolution, so the chain is bounded by the
    /// number of distinct proxies; the last successful placement is
    /// returned.
    pub async fn resolve_proxy_bids(
        &self,
        auction_id: &AuctionId,
        leading_amount: f64,
        leading_bidder: &UserId,
    ) -> Result<Option<BidPlacement>, Error> {
        trace!(
            "resolving proxies on auction {} above {}",
            auction_id,
            leading_amount
        );
        let mut leading_amount = leading_amount;
        let mut leading_bidder = leading_bidder.clone();
        let mut responded: Vec<UserId> = Vec::new();
        let mut last_placement = None;

        loop {
            let Some(auction) = self.store.auction(auction_id).await? else {
                return Err(Error::NotFound(auction_id.clone()));
            };
            if auction.status.is_terminal() {
                break;
            }

            let candidates: Vec<ProxyBid> = self
                .store
                .active_proxy_bids(auction_id, Some(&leading_bidder))
                .await?
                .into_iter()
                .filter(|proxy| !responded.contains(&proxy.bidder))
                .collect();
            let Some(selected) = select_responding_proxy(&candidates) else {
                break;
            };

            let candidate_amount = leading_amount + auction.min_increment;
            if candidate_amount > selected.max_amount {
                // the top proxy alone decides the round; it cannot meet the
                // increment, so resolution ends here
                break;
            }

            let placement = self
                .place_bid(auction_id, &selected.bidder, candidate_amount)
                .await?;
            self.record_proxy_response(&selected.id, candidate_amount)
                .await?;

            debug!(
                "proxy of {} answered with {} on auction {}",
                selected.bidder, candidate_amount, auction_id
            );
            responded.push(selected.bidder.clone());
            leading_amount = candidate_amount;
            leading_bidder = selected.bidder.clone();
            last_placement = Some(placement);
        }
        Ok(last_placement)
    }

    async fn record_proxy_response(
        &self,
        proxy_id: &ProxyBidId,
        amount: f64,
    ) -> Result<(), Error> {
        let mut tx = self.store.begin().await?;
        tx.set_proxy_current_bid(proxy_id, amount).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Register (or replace) `bidder`'s standing maximum on an auction.
    pub async fn setup_proxy_bid(
        &self,
        auction_id: &AuctionId,
        bidder: &UserId,
        max_amount: f64,
    ) -> Result<ProxyBid, Error> {
        trace!(
            "proxy of {} up to {} on auction {}",
            bidder,
            max_amount,
            auction_id
        );
        let max_amount = Amount::try_new(max_amount)
            .map_err(|_| Error::InvalidInput)?
            .into_inner();

        with_retry(&self.retry, is_transient, || {
            self.try_setup_proxy(auction_id, bidder, max_amount)
        })
        .await
        .map_err(|error| promote_conflict(error, auction_id))
    }

    async fn try_setup_proxy(
        &self,
        auction_id: &AuctionId,
        bidder: &UserId,
        max_amount: f64,
    ) -> Result<ProxyBid, Error> {
        let mut tx = self.store.begin().await?;
        let Some(auction) = tx.auction_for_update(auction_id).await? else {
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
        if bidder == &auction.seller {
            tx.rollback().await?;
            return Err(BidRejection::SelfBid.into());
        }
        if max_amount <= auction.current_price {
            tx.rollback().await?;
            return Err(Error::ProxyRejected);
        }

        let proxy = ProxyBid {
            id:          ProxyBidId::generate(),
            auction:     auction_id.clone(),
            bidder:      bidder.clone(),
            max_amount,
            current_bid: None,
            active:      true,
            created_at:  self.clock.now(),
        };
        tx.upsert_proxy_bid(proxy.clone()).await?;
        tx.commit().await?;
        Ok(proxy)
    }
}

/// Greatest standing maximum answers; ties go to the proxy registered
/// first, then to the smaller id so resolution stays deterministic.
fn select_responding_proxy(candidates: &[ProxyBid]) -> Option<&ProxyBid> {
    candidates.iter().max_by(|a, b| {
        a.max_amount
            .partial_cmp(&b.max_amount)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| b.id.cmp(&a.id))
    })
}
