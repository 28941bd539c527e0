use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use model::domain::auction::Auction;
use model::domain::bid::{Bid, BidStatus, Extension, ProxyBid};
use model::{AuctionId, BidId, ProxyBidId, UserId};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// A concurrent transaction committed a conflicting mutation first.
    /// Transient; the caller may retry against the new state.
    #[error("conflicting concurrent update, transaction aborted")]
    Conflict,
    #[error("transaction exceeded its {0:?} time budget")]
    TimedOut(Duration),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict)
    }
}

/// Transactional owner of the durable auction state. Implementations map
/// their backend's conflict reports to [`StoreError::Conflict`].
#[async_trait]
pub trait AuctionStore: Send + Sync {
    /// Open a serializable transaction.
    async fn begin<'a>(&'a self)
        -> Result<Box<dyn StoreTx + 'a>, StoreError>;

    /// Committed state of one auction.
    async fn auction(
        &self,
        id: &AuctionId,
    ) -> Result<Option<Auction>, StoreError>;

    /// Active proxy bids on an auction, optionally without one bidder's.
    async fn active_proxy_bids(
        &self,
        auction: &AuctionId,
        excluding: Option<&UserId>,
    ) -> Result<Vec<ProxyBid>, StoreError>;

    /// Auctions the closing sweep should pick up.
    async fn expired_active_auctions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuctionId>, StoreError>;
}

/// One serializable transaction. Dropping an uncommitted transaction
/// discards its writes.
#[async_trait]
pub trait StoreTx: Send {
    async fn auction_for_update(
        &mut self,
        id: &AuctionId,
    ) -> Result<Option<Auction>, StoreError>;

    async fn winning_bid(
        &mut self,
        auction: &AuctionId,
    ) -> Result<Option<Bid>, StoreError>;

    async fn insert_bid(&mut self, bid: Bid) -> Result<(), StoreError>;

    async fn update_bid_status(
        &mut self,
        id: &BidId,
        status: BidStatus,
    ) -> Result<(), StoreError>;

    async fn update_auction(
        &mut self,
        auction: Auction,
    ) -> Result<(), StoreError>;

    async fn insert_extension(
        &mut self,
        extension: Extension,
    ) -> Result<(), StoreError>;

    /// Register a proxy bid, replacing the bidder's prior one for the same
    /// auction.
    async fn upsert_proxy_bid(
        &mut self,
        proxy: ProxyBid,
    ) -> Result<(), StoreError>;

    async fn set_proxy_current_bid(
        &mut self,
        id: &ProxyBidId,
        amount: f64,
    ) -> Result<(), StoreError>;

    async fn deactivate_proxy_bids(
        &mut self,
        auction: &AuctionId,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct VersionedAuction {
    version: u64,
    row:     Auction,
}

#[derive(Debug, Default)]
struct Tables {
    auctions:   HashMap<AuctionId, VersionedAuction>,
    bids:       HashMap<BidId, Bid>,
    proxy_bids: HashMap<ProxyBidId, ProxyBid>,
    extensions: Vec<Extension>,
}

/// Reference store: optimistic per-auction versioning. Every transaction
/// records the version of each auction row it read; commit re-verifies and
/// bumps them under the table write lock, so two transactions touching the
/// same auction serialize and the loser reports [`StoreError::Conflict`].
pub struct InMemoryStore {
    tables:     RwLock<Tables>,
    tx_timeout: Duration,
}

impl InMemoryStore {
    pub fn new(tx_timeout: Duration) -> Self {
        Self { tables: RwLock::new(Tables::default()), tx_timeout }
    }

    /// Seed an auction record; listing creation itself is outside the
    /// engine.
    pub async fn insert_auction(&self, auction: Auction) {
        let mut tables = self.tables.write().await;
        tables.auctions.insert(
            auction.id.clone(),
            VersionedAuction { version: 0, row: auction },
        );
    }

    pub async fn bids_for(&self, auction: &AuctionId) -> Vec<Bid> {
        let tables = self.tables.read().await;
        let mut bids: Vec<Bid> = tables
            .bids
            .values()
            .filter(|bid| &bid.auction == auction)
            .cloned()
            .collect();
        bids.sort_by(|a, b| {
            a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
        });
        bids
    }

    pub async fn proxy_bids_for(&self, auction: &AuctionId) -> Vec<ProxyBid> {
        let tables = self.tables.read().await;
        let mut proxies: Vec<ProxyBid> = tables
            .proxy_bids
            .values()
            .filter(|proxy| &proxy.auction == auction)
            .cloned()
            .collect();
        proxies.sort_by(|a, b| {
            a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
        });
        proxies
    }

    pub async fn extensions_for(&self, auction: &AuctionId) -> Vec<Extension> {
        let tables = self.tables.read().await;
        tables
            .extensions
            .iter()
            .filter(|extension| &extension.auction == auction)
            .cloned()
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl AuctionStore for InMemoryStore {
    async fn begin<'a>(
        &'a self,
    ) -> Result<Box<dyn StoreTx + 'a>, StoreError> {
        Ok(Box::new(InMemoryTx {
            store:   self,
            started: Instant::now(),
            reads:   HashMap::new(),
            writes:  Vec::new(),
        }))
    }

    async fn auction(
        &self,
        id: &AuctionId,
    ) -> Result<Option<Auction>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.auctions.get(id).map(|versioned| versioned.row.clone()))
    }

    async fn active_proxy_bids(
        &self,
        auction: &AuctionId,
        excluding: Option<&UserId>,
    ) -> Result<Vec<ProxyBid>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .proxy_bids
            .values()
            .filter(|proxy| {
                proxy.active
                    && &proxy.auction == auction
                    && excluding != Some(&proxy.bidder)
            })
            .cloned()
            .collect())
    }

    async fn expired_active_auctions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuctionId>, StoreError> {
        use model::domain::auction::AuctionStatus;
        let tables = self.tables.read().await;
        Ok(tables
            .auctions
            .values()
            .filter(|versioned| {
                versioned.row.status == AuctionStatus::Active
                    && versioned.row.deadline <= now
            })
            .map(|versioned| versioned.row.id.clone())
            .collect())
    }
}

#[derive(Debug)]
enum Write {
    InsertBid(Bid),
    BidStatus(BidId, BidStatus),
    Auction(Auction),
    Extension(Extension),
    UpsertProxy(ProxyBid),
    ProxyCurrentBid(ProxyBidId, f64),
    DeactivateProxies(AuctionId),
}

struct InMemoryTx<'a> {
    store:   &'a InMemoryStore,
    started: Instant,
    /// Versions of the auction rows this transaction read.
    reads:   HashMap<AuctionId, u64>,
    writes:  Vec<Write>,
}

impl InMemoryTx<'_> {
    fn check_budget(&self) -> Result<(), StoreError> {
        if self.started.elapsed() > self.store.tx_timeout {
            return Err(StoreError::TimedOut(self.store.tx_timeout));
        }
        Ok(())
    }

    /// Record the version of an auction row this transaction depends on; a
    /// row that moved since an earlier read aborts right away.
    fn note_read(
        &mut self,
        tables: &Tables,
        auction: &AuctionId,
    ) -> Result<(), StoreError> {
        let Some(versioned) = tables.auctions.get(auction) else {
            return Ok(());
        };
        match self.reads.get(auction).copied() {
            Some(seen) if seen != versioned.version => {
                Err(StoreError::Conflict)
            }
            Some(_) => Ok(()),
            None => {
                self.reads.insert(auction.clone(), versioned.version);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl StoreTx for InMemoryTx<'_> {
    async fn auction_for_update(
        &mut self,
        id: &AuctionId,
    ) -> Result<Option<Auction>, StoreError> {
        self.check_budget()?;
        let tables = self.store.tables.read().await;
        self.note_read(&tables, id)?;
        Ok(tables.auctions.get(id).map(|versioned| versioned.row.clone()))
    }

    async fn winning_bid(
        &mut self,
        auction: &AuctionId,
    ) -> Result<Option<Bid>, StoreError> {
        self.check_budget()?;
        let tables = self.store.tables.read().await;
        self.note_read(&tables, auction)?;
        Ok(tables
            .bids
            .values()
            .find(|bid| {
                &bid.auction == auction && bid.status == BidStatus::Winning
            })
            .cloned())
    }

    async fn insert_bid(&mut self, bid: Bid) -> Result<(), StoreError> {
        self.check_budget()?;
        self.writes.push(Write::InsertBid(bid));
        Ok(())
    }

    async fn update_bid_status(
        &mut self,
        id: &BidId,
        status: BidStatus,
    ) -> Result<(), StoreError> {
        self.check_budget()?;
        self.writes.push(Write::BidStatus(id.clone(), status));
        Ok(())
    }

    async fn update_auction(
        &mut self,
        auction: Auction,
    ) -> Result<(), StoreError> {
        self.check_budget()?;
        self.writes.push(Write::Auction(auction));
        Ok(())
    }

    async fn insert_extension(
        &mut self,
        extension: Extension,
    ) -> Result<(), StoreError> {
        self.check_budget()?;
        self.writes.push(Write::Extension(extension));
        Ok(())
    }

    async fn upsert_proxy_bid(
        &mut self,
        proxy: ProxyBid,
    ) -> Result<(), StoreError> {
        self.check_budget()?;
        self.writes.push(Write::UpsertProxy(proxy));
        Ok(())
    }

    async fn set_proxy_current_bid(
        &mut self,
        id: &ProxyBidId,
        amount: f64,
    ) -> Result<(), StoreError> {
        self.check_budget()?;
        self.writes.push(Write::ProxyCurrentBid(id.clone(), amount));
        Ok(())
    }

    async fn deactivate_proxy_bids(
        &mut self,
        auction: &AuctionId,
    ) -> Result<(), StoreError> {
        self.check_budget()?;
        self.writes.push(Write::DeactivateProxies(auction.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.check_budget()?;
        let InMemoryTx { store, reads, writes, .. } = *self;
        let mut tables = store.tables.write().await;

        for (auction, seen) in &reads {
            let current =
                tables.auctions.get(auction).map(|v| v.version);
            if current != Some(*seen) {
                return Err(StoreError::Conflict);
            }
        }

        if writes.is_empty() {
            return Ok(());
        }

        for write in writes {
            match write {
                Write::InsertBid(bid) => {
                    tables.bids.insert(bid.id.clone(), bid);
                }
                Write::BidStatus(id, status) => {
                    let bid = tables.bids.get_mut(&id).ok_or_else(|| {
                        StoreError::Backend(anyhow!(
                            "bid {} vanished mid-transaction",
                            id
                        ))
                    })?;
                    bid.status = status;
                }
                Write::Auction(auction) => {
                    let versioned = tables
                        .auctions
                        .get_mut(&auction.id)
                        .ok_or_else(|| {
                            StoreError::Backend(anyhow!(
                                "auction {} vanished mid-transaction",
                                auction.id
                            ))
                        })?;
                    versioned.row = auction;
                }
                Write::Extension(extension) => {
                    tables.extensions.push(extension);
                }
                Write::UpsertProxy(proxy) => {
                    tables.proxy_bids.retain(|_, existing| {
                        !(existing.auction == proxy.auction
                            && existing.bidder == proxy.bidder)
                    });
                    tables.proxy_bids.insert(proxy.id.clone(), proxy);
                }
                Write::ProxyCurrentBid(id, amount) => {
                    if let Some(proxy) = tables.proxy_bids.get_mut(&id) {
                        proxy.current_bid = Some(amount);
                    }
                }
                Write::DeactivateProxies(auction) => {
                    for proxy in tables.proxy_bids.values_mut() {
                        if proxy.auction == auction {
                            proxy.active = false;
                        }
                    }
                }
            }
        }

        for auction in reads.keys() {
            if let Some(versioned) = tables.auctions.get_mut(auction) {
                versioned.version += 1;
            }
        }

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        trace!("transaction rolled back, {} writes dropped", self.writes.len());
        Ok(())
    }
}
