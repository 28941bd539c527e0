use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::auction::Auction;
use crate::domain::bid::Bid;
use crate::UserId;

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionInfo {
    pub previous_deadline: DateTime<Utc>,
    pub new_deadline:      DateTime<Utc>,
    pub extension_number:  u32,
}

/// Outcome of one committed bid placement.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BidPlacement {
    pub bid:          Bid,
    /// The auction as committed by this placement.
    pub auction:      Auction,
    pub was_extended: bool,
    pub extension:    Option<ExtensionInfo>,
    /// Bidders whose winning bid this placement demoted.
    pub outbid_users: Vec<UserId>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WinningBid {
    pub user_id: UserId,
    pub amount:  f64,
}

/// Outcome of closing (or attempting to re-close) an auction.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CloseOutcome {
    pub auction:        Auction,
    pub winner:         Option<WinningBid>,
    pub reserve_met:    bool,
    /// The auction was already terminal; nothing changed and no event was
    /// emitted.
    pub already_closed: bool,
}
