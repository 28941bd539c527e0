use std::sync::Arc;

use model::domain::bid::ProxyBid;
use model::view::bid::{BidPlacement, CloseOutcome};
use model::{AuctionId, UserId};

use crate::service::bidding::BiddingService;
use crate::service::closing::{ClosingService, SweepReport};

#[derive(thiserror::Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Bidding(#[from] crate::service::bidding::Error),
    #[error(transparent)]
    Closing(#[from] crate::service::closing::Error),
}

/// Outcome of one incoming human bid: the direct placement plus the last
/// placement of the proxy war it set off, if any.
#[derive(Debug, Clone)]
pub struct BidRequestOutcome {
    pub placement:    BidPlacement,
    pub proxy_result: Option<BidPlacement>,
}

/// Record a human bid, then let standing proxies answer it.
pub async fn place_bid(
    auction_id: &AuctionId,
    bidder: &UserId,
    amount: f64,
    bidding: &Arc<BiddingService>,
) -> Result<BidRequestOutcome, ControllerError> {
    trace!("bid request of {} on auction {}", amount, auction_id);
    let placement = bidding.place_bid(auction_id, bidder, amount).await?;
    let proxy_result = bidding
        .resolve_proxy_bids(auction_id, placement.bid.amount, bidder)
        .await?;
    Ok(BidRequestOutcome { placement, proxy_result })
}

/// Register a standing maximum for automatic bidding.
pub async fn setup_proxy_bid(
    auction_id: &AuctionId,
    bidder: &UserId,
    max_amount: f64,
    bidding: &Arc<BiddingService>,
) -> Result<ProxyBid, ControllerError> {
    trace!("proxy setup request on auction {}", auction_id);
    Ok(bidding.setup_proxy_bid(auction_id, bidder, max_amount).await?)
}

/// End an auction now, selecting the winner.
pub async fn close_auction(
    auction_id: &AuctionId,
    closing: &Arc<ClosingService>,
) -> Result<CloseOutcome, ControllerError> {
    Ok(closing.close_auction(auction_id).await?)
}

/// Withdraw an auction without a sale.
pub async fn cancel_auction(
    auction_id: &AuctionId,
    closing: &Arc<ClosingService>,
) -> Result<CloseOutcome, ControllerError> {
    Ok(closing.cancel_auction(auction_id).await?)
}

/// Instant purchase at the listing's buy-now price.
pub async fn buy_now(
    auction_id: &AuctionId,
    buyer: &UserId,
    closing: &Arc<ClosingService>,
) -> Result<CloseOutcome, ControllerError> {
    Ok(closing.buy_now(auction_id, buyer).await?)
}

/// One pass of the expiry sweep; meant to be invoked on an interval by the
/// scheduling collaborator.
pub async fn sweep_expired(
    closing: &Arc<ClosingService>,
) -> Result<SweepReport, ControllerError> {
    Ok(closing.sweep_expired().await?)
}
