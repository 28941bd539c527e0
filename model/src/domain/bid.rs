use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AuctionId, BidId, ProxyBidId, UserId};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidStatus {
    /// Leads the auction; at most one per auction at any committed instant.
    Winning,
    Outbid,
    Won,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id:         BidId,
    pub auction:    AuctionId,
    pub bidder:     UserId,
    pub amount:     f64,
    pub status:     BidStatus,
    pub created_at: DateTime<Utc>,
}

/// A standing maximum a bidder authorizes the engine to bid up to on their
/// behalf. One per (auction, bidder); a new setup replaces the prior one.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProxyBid {
    pub id:          ProxyBidId,
    pub auction:     AuctionId,
    pub bidder:      UserId,
    pub max_amount:  f64,
    /// The amount this proxy last caused to be placed, `current_bid ≤
    /// max_amount`.
    pub current_bid: Option<f64>,
    pub active:      bool,
    pub created_at:  DateTime<Utc>,
}

/// Audit record of one anti-sniping deadline push. Append-only.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    pub auction:           AuctionId,
    pub previous_deadline: DateTime<Utc>,
    pub new_deadline:      DateTime<Utc>,
    pub extension_number:  u32,
    pub triggering_bid:    BidId,
}
