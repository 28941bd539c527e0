//! Time-bound auction bidding engine: bid placement under serializable
//! transactions, proxy (auto-)bidding, anti-sniping deadline extension and
//! deterministic closing. Transport, identity and durable storage are
//! collaborators behind the traits in [`repository`].
#[macro_use]
extern crate tracing;

pub mod config;
pub mod controller;
pub mod repository;
pub mod service;

pub use config::BiddingConfig;
pub use repository::clock::{Clock, ManualClock, SystemClock};
pub use repository::outbox::Outbox;
pub use repository::retry::RetryPolicy;
pub use repository::store::{AuctionStore, InMemoryStore, StoreError, StoreTx};
pub use service::bidding::BiddingService;
pub use service::closing::{ClosingService, SweepReport};
