use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::bid::Bid;
use crate::{AuctionId, UserId};

/// Domain events handed to the real-time broadcast collaborator. Emitted
/// strictly after the originating transaction commits.
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuctionEvent {
    #[serde(rename_all = "camelCase")]
    BidPlaced {
        auction_id:    AuctionId,
        bid:           Bid,
        current_price: f64,
    },
    #[serde(rename_all = "camelCase")]
    BidOutbid {
        auction_id:  AuctionId,
        bidder:      UserId,
        new_highest: f64,
    },
    #[serde(rename_all = "camelCase")]
    AuctionExtended {
        auction_id:        AuctionId,
        previous_deadline: DateTime<Utc>,
        new_deadline:      DateTime<Utc>,
        extension_number:  u32,
    },
    #[serde(rename_all = "camelCase")]
    AuctionEnded {
        auction_id:  AuctionId,
        winner:      Option<UserId>,
        final_price: Option<f64>,
        reserve_met: bool,
    },
}
