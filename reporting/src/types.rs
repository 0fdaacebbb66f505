use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

/// Domain identity (eTLD+1) of a buyer or seller participating in an
/// auction. Stored lowercased so comparisons are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdTechId(String);

impl AdTechId {
    pub fn new(identifier: &str) -> Self {
        AdTechId(identifier.trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdTechId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AdTechId {
    fn from(identifier: &str) -> Self {
        AdTechId::new(identifier)
    }
}

/// One ad tech's registered win/loss beacon templates for one custom
/// audience in one auction.
///
/// Templates are kept as raw strings because they may contain `${...}`
/// macros that are not valid URL characters; they only become a [`Url`]
/// after substitution and validation in the processor.
#[derive(Debug, Clone)]
pub struct DebugReportEntry {
    pub buyer: AdTechId,
    pub ca_name: String,
    pub win_template: Option<String>,
    pub loss_template: Option<String>,
    pub seller: Option<AdTechId>,
    pub seller_reject_reason: Option<String>,
}

impl DebugReportEntry {
    pub fn new(buyer: AdTechId, ca_name: impl Into<String>) -> Self {
        DebugReportEntry {
            buyer,
            ca_name: ca_name.into(),
            win_template: None,
            loss_template: None,
            seller: None,
            seller_reject_reason: None,
        }
    }

    pub fn with_win_template(mut self, template: impl Into<String>) -> Self {
        self.win_template = Some(template.into());
        self
    }

    pub fn with_loss_template(mut self, template: impl Into<String>) -> Self {
        self.loss_template = Some(template.into());
        self
    }

    pub fn with_seller(mut self, seller: AdTechId) -> Self {
        self.seller = Some(seller);
        self
    }

    pub fn with_reject_reason(mut self, reason: impl Into<String>) -> Self {
        self.seller_reject_reason = Some(reason.into());
        self
    }
}

/// Outcome of one completed auction, produced by the auction engine.
/// The default value is the auction with no winner.
#[derive(Debug, Clone, Default)]
pub struct AuctionSignals {
    pub winning_buyer: Option<AdTechId>,
    pub winning_ca_name: Option<String>,
    pub winning_bid: f64,
    pub second_highest_buyer: Option<AdTechId>,
    pub second_highest_bid: f64,
}

impl AuctionSignals {
    /// True when the entry's custom audience is the one that won the auction.
    pub fn is_winning_entry(&self, entry: &DebugReportEntry) -> bool {
        self.winning_buyer.as_ref() == Some(&entry.buyer)
            && self.winning_ca_name.as_deref() == Some(entry.ca_name.as_str())
    }
}

/// Which template side produced a resolved beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportSide {
    Win,
    Loss,
}

impl ReportSide {
    pub fn is_win(self) -> bool {
        matches!(self, ReportSide::Win)
    }
}

/// A fully resolved, validated beacon ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBeacon {
    pub uri: Url,
    pub side: ReportSide,
}

/// A beacon accepted for deferred delivery, before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewPendingBeacon {
    pub uri: Url,
    pub is_win: bool,
    pub enqueued_at_ms: u64,
}

/// One row of the pending-beacon queue.
#[derive(Debug, Clone)]
pub struct PendingBeacon {
    pub id: u64,
    pub uri: Url,
    pub is_win: bool,
    pub enqueued_at_ms: u64,
}

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
