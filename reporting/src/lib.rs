//! Debug-report generation and delivery for ad auctions.
//!
//! After an auction resolves, participating ad techs may have registered
//! templated win/loss beacon URIs. This crate resolves those templates
//! against the auction outcome, validates and caps the results, and
//! delivers them best-effort: immediately, or through a persistent queue
//! drained by a periodically scheduled batch worker. Delivery never fails
//! or delays the auction path.

pub mod config;
pub mod metrics_defs;
pub mod processor;
pub mod scheduler;
pub mod sender;
pub mod store;
pub mod transport;
pub mod types;
pub mod worker;

pub use config::{DeliveryMode, ReportingConfig};
pub use sender::{BeaconSender, DeliveryError};
pub use types::{AdTechId, AuctionSignals, DebugReportEntry, ResolvedBeacon};
pub use worker::{BeaconSenderWorker, DeliveryRunReport};
