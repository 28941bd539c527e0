use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AuctionId, UserId};

/// Lifecycle of an auction listing. Terminal states never re-open.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionStatus {
    Draft,
    Active,
    Ended,
    Sold,
    Cancelled,
}

impl AuctionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuctionStatus::Ended
                | AuctionStatus::Sold
                | AuctionStatus::Cancelled
        )
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            AuctionStatus::Draft => "DRAFT",
            AuctionStatus::Active => "ACTIVE",
            AuctionStatus::Ended => "ENDED",
            AuctionStatus::Sold => "SOLD",
            AuctionStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{}", name)
    }
}

/// Anti-sniping configuration carried by each auction.
#[serde_with::serde_as]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AutoExtend {
    pub enabled: bool,

    /// A bid landing closer than this to the deadline triggers a push.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub threshold: Duration,

    /// How far a single push moves the deadline.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub extension: Duration,

    pub max_extensions: u32,
}

impl AutoExtend {
    pub fn disabled() -> Self {
        Self {
            enabled:        false,
            threshold:      Duration::ZERO,
            extension:      Duration::ZERO,
            max_extensions: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id:              AuctionId,
    pub seller:          UserId,
    pub status:          AuctionStatus,
    pub starting_price:  f64,
    pub current_price:   f64,
    pub reserve_price:   Option<f64>,
    pub buy_now_price:   Option<f64>,
    pub min_increment:   f64,
    pub deadline:        DateTime<Utc>,
    pub auto_extend:     AutoExtend,
    pub extension_count: u32,
    pub bid_count:       u64,
    pub winner:          Option<UserId>,
    pub final_price:     Option<f64>,
}

/// Why a bid was turned away. Detected before any write, safe to retry
/// after adjusting the input.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BidRejection {
    #[error("Auction is not active. Current status: {status}.")]
    NotActive { status: AuctionStatus },
    #[error("Auction has ended")]
    Expired,
    #[error(
        "Bid must be at least {minimum} (current price {current} plus \
         minimum increment {increment})"
    )]
    TooLow { minimum: f64, current: f64, increment: f64 },
    #[error("Cannot bid on your own auction")]
    SelfBid,
}

/// Deadline push granted by the anti-sniping policy for one bid.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantedExtension {
    pub previous_deadline: DateTime<Utc>,
    pub new_deadline:      DateTime<Utc>,
    pub extension_number:  u32,
}

impl Auction {
    /// Smallest acceptable bid right now.
    pub fn minimum_bid(&self) -> f64 {
        self.current_price + self.min_increment
    }

    pub fn reserve_met(&self, amount: f64) -> bool {
        self.reserve_price.map_or(true, |reserve| amount >= reserve)
    }

    /// Legality of `amount` from `bidder` at instant `now`. Pure; the same
    /// `now` must be reused for the extension decision of the same bid.
    pub fn validate_bid(
        &self,
        bidder: &UserId,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<(), BidRejection> {
        if self.status != AuctionStatus::Active {
            return Err(BidRejection::NotActive { status: self.status });
        }
        if now > self.deadline {
            return Err(BidRejection::Expired);
        }
        if amount <= self.current_price || amount < self.minimum_bid() {
            return Err(BidRejection::TooLow {
                minimum:   self.minimum_bid(),
                current:   self.current_price,
                increment: self.min_increment,
            });
        }
        if bidder == &self.seller {
            return Err(BidRejection::SelfBid);
        }
        Ok(())
    }

    /// Anti-sniping policy: does a bid landing at `now` push the deadline?
    /// Extends iff auto-extend is on, the deadline is strictly ahead but
    /// closer than the threshold, and the extension budget is not used up.
    pub fn extension_after(
        &self,
        now: DateTime<Utc>,
    ) -> Option<GrantedExtension> {
        if !self.auto_extend.enabled {
            return None;
        }
        if self.extension_count >= self.auto_extend.max_extensions {
            return None;
        }
        let threshold =
            chrono::Duration::from_std(self.auto_extend.threshold).ok()?;
        let remaining = self.deadline.signed_duration_since(now);
        if remaining <= chrono::Duration::zero() || remaining >= threshold {
            return None;
        }
        let extension =
            chrono::Duration::from_std(self.auto_extend.extension).ok()?;
        Some(GrantedExtension {
            previous_deadline: self.deadline,
            new_deadline:      self.deadline + extension,
            extension_number:  self.extension_count + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    fn active_auction() -> Auction {
        Auction {
            id:              AuctionId::generate(),
            seller:          UserId::generate(),
            status:          AuctionStatus::Active,
            starting_price:  10.0,
            current_price:   15.0,
            reserve_price:   None,
            buy_now_price:   None,
            min_increment:   1.0,
            deadline:        Utc::now() + chrono::Duration::hours(24),
            auto_extend:     AutoExtend::disabled(),
            extension_count: 0,
            bid_count:       0,
            winner:          None,
            final_price:     None,
        }
    }

    #[parameterized(
        draft = { AuctionStatus::Draft },
        ended = { AuctionStatus::Ended },
        sold = { AuctionStatus::Sold },
        cancelled = { AuctionStatus::Cancelled },
    )]
    fn test_rejects_non_active_status(status: AuctionStatus) {
        let mut auction = active_auction();
        auction.status = status;
        let err = auction
            .validate_bid(&UserId::generate(), 20.0, Utc::now())
            .unwrap_err();
        assert_eq!(err, BidRejection::NotActive { status });
        assert!(format!("{}", err).contains(&format!("{}", status)));
    }

    #[test]
    fn test_not_active_message_names_status() {
        let mut auction = active_auction();
        auction.status = AuctionStatus::Ended;
        let err = auction
            .validate_bid(&UserId::generate(), 20.0, Utc::now())
            .unwrap_err();
        assert_eq!(
            format!("{}", err),
            "Auction is not active. Current status: ENDED."
        );
    }

    #[test]
    fn test_rejects_past_deadline() {
        let auction = active_auction();
        let late = auction.deadline + chrono::Duration::seconds(1);
        assert_eq!(
            auction.validate_bid(&UserId::generate(), 20.0, late),
            Err(BidRejection::Expired)
        );
    }

    #[test]
    fn test_accepts_exactly_at_deadline() {
        let auction = active_auction();
        assert!(auction
            .validate_bid(&UserId::generate(), 20.0, auction.deadline)
            .is_ok());
    }

    #[parameterized(
        equal_to_current = { 15.0 },
        below_current = { 14.0 },
        above_current_below_increment = { 15.5 },
    )]
    fn test_rejects_too_low(amount: f64) {
        let auction = active_auction();
        let err = auction
            .validate_bid(&UserId::generate(), amount, Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            BidRejection::TooLow {
                minimum:   16.0,
                current:   15.0,
                increment: 1.0,
            }
        );
        assert!(format!("{}", err).contains("16"));
    }

    #[test]
    fn test_accepts_exact_minimum() {
        let auction = active_auction();
        assert!(auction
            .validate_bid(&UserId::generate(), 16.0, Utc::now())
            .is_ok());
    }

    #[test]
    fn test_rejects_seller_bidding_own_auction() {
        let auction = active_auction();
        let seller = auction.seller.clone();
        assert_eq!(
            auction.validate_bid(&seller, 20.0, Utc::now()),
            Err(BidRejection::SelfBid)
        );
    }

    fn extendable_auction(now: DateTime<Utc>) -> Auction {
        let mut auction = active_auction();
        auction.deadline = now + chrono::Duration::seconds(30);
        auction.auto_extend = AutoExtend {
            enabled:        true,
            threshold:      Duration::from_secs(120),
            extension:      Duration::from_secs(60),
            max_extensions: 2,
        };
        auction
    }

    #[test]
    fn test_extends_within_threshold() {
        let now = Utc::now();
        let auction = extendable_auction(now);
        let granted = auction.extension_after(now).unwrap();
        assert_eq!(granted.previous_deadline, auction.deadline);
        assert_eq!(
            granted.new_deadline,
            auction.deadline + chrono::Duration::seconds(60)
        );
        assert_eq!(granted.extension_number, 1);
    }

    #[test]
    fn test_no_extension_when_disabled() {
        let now = Utc::now();
        let mut auction = extendable_auction(now);
        auction.auto_extend.enabled = false;
        assert_eq!(auction.extension_after(now), None);
    }

    #[test]
    fn test_no_extension_outside_threshold() {
        let now = Utc::now();
        let mut auction = extendable_auction(now);
        auction.deadline = now + chrono::Duration::seconds(180);
        assert_eq!(auction.extension_after(now), None);
    }

    #[test]
    fn test_no_extension_at_exact_threshold() {
        let now = Utc::now();
        let mut auction = extendable_auction(now);
        auction.deadline = now + chrono::Duration::seconds(120);
        assert_eq!(auction.extension_after(now), None);
    }

    #[test]
    fn test_no_extension_once_budget_spent() {
        let now = Utc::now();
        let mut auction = extendable_auction(now);
        auction.extension_count = 2;
        assert_eq!(auction.extension_after(now), None);
    }

    #[test]
    fn test_no_extension_past_deadline() {
        let now = Utc::now();
        let mut auction = extendable_auction(now);
        auction.deadline = now;
        assert_eq!(auction.extension_after(now), None);
    }

    #[test]
    fn test_reserve() {
        let mut auction = active_auction();
        assert!(auction.reserve_met(0.1));
        auction.reserve_price = Some(20.0);
        assert!(!auction.reserve_met(19.99));
        assert!(auction.reserve_met(20.0));
    }
}
