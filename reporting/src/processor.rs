//! Resolution of registered debug-report templates against an auction
//! outcome.
//!
//! Ad techs declare remote URLs to receive a fire-and-forget GET when an
//! auction is won or lost, with `${...}` macros substituted from the
//! outcome. Resolution is pure and total: malformed or ineligible input
//! contributes nothing to the output instead of failing the auction path.

use crate::metrics_defs::{BEACONS_DROPPED_CAPPED, BEACONS_DROPPED_INVALID, BEACONS_EMITTED};
use crate::types::{AuctionSignals, DebugReportEntry, ReportSide, ResolvedBeacon};
use indexmap::IndexMap;
use shared::counter;
use std::collections::HashMap;
use url::Url;

/// Cap observed in production traffic; overridable through configuration.
pub const DEFAULT_MAX_URIS_PER_AD_TECH: usize = 75;

/// Resolved URIs at or above this many characters are discarded, keeping
/// beacons inside the platform URL length budget.
const MAX_URI_CHARS: usize = 2048;

const WINNING_BID_MACRO: &str = "${winningBid}";
const MADE_WINNING_BID_MACRO: &str = "${madeWinningBid}";
const HIGHEST_SCORING_OTHER_BID_MACRO: &str = "${highestScoringOtherBid}";
const MADE_HIGHEST_SCORING_OTHER_BID_MACRO: &str = "${madeHighestScoringOtherBid}";
const REJECT_REASON_MACRO: &str = "${rejectReason}";

const REJECT_REASON_NOT_AVAILABLE: &str = "not-available";

/// Reject reasons a seller is allowed to surface. Anything else resolves to
/// `not-available`.
const RECOGNIZED_REJECT_REASONS: &[&str] = &[
    "not-available",
    "invalid-bid",
    "bid-below-auction-floor",
    "pending-approval-by-exchange",
    "disapproved-by-exchange",
    "blocked-by-publisher",
    "language-exclusions",
    "category-exclusions",
];

/// Resolve every entry of one auction into validated, capped beacons.
///
/// Losing entries report through their loss template and the winning entry
/// through its win template; an entry whose preferred template is missing
/// falls back to the other side. At most `cap` beacons survive per ad-tech
/// host, counted in processing order.
pub fn resolve(
    entries: &[DebugReportEntry],
    signals: &AuctionSignals,
    cap: usize,
) -> Vec<ResolvedBeacon> {
    let reject_reasons = collect_reject_reasons(entries);
    let resolved: Vec<ResolvedBeacon> = entries
        .iter()
        .filter_map(|entry| resolve_entry(entry, signals, &reject_reasons))
        .collect();
    apply_per_ad_tech_cap(resolved, cap)
}

/// [`resolve`] projected onto bare URIs for callers that do not care about
/// the win/loss side.
pub fn resolve_uris(entries: &[DebugReportEntry], signals: &AuctionSignals, cap: usize) -> Vec<Url> {
    resolve(entries, signals, cap)
        .into_iter()
        .map(|beacon| beacon.uri)
        .collect()
}

fn resolve_entry(
    entry: &DebugReportEntry,
    signals: &AuctionSignals,
    reject_reasons: &HashMap<String, &str>,
) -> Option<ResolvedBeacon> {
    let (template, side) = select_template(entry, signals)?;
    let substituted = apply_macros(template, entry, signals, reject_reasons);
    match validate(&substituted) {
        Some(uri) => Some(ResolvedBeacon { uri, side }),
        None => {
            counter!(BEACONS_DROPPED_INVALID).increment(1);
            None
        }
    }
}

/// The winning custom audience prefers its win template and everyone else
/// their loss template; when the preferred side was never registered the
/// other side still reports.
fn select_template<'a>(
    entry: &'a DebugReportEntry,
    signals: &AuctionSignals,
) -> Option<(&'a str, ReportSide)> {
    let win = entry
        .win_template
        .as_deref()
        .map(|template| (template, ReportSide::Win));
    let loss = entry
        .loss_template
        .as_deref()
        .map(|template| (template, ReportSide::Loss));
    if signals.is_winning_entry(entry) {
        win.or(loss)
    } else {
        loss.or(win)
    }
}

fn apply_macros(
    template: &str,
    entry: &DebugReportEntry,
    signals: &AuctionSignals,
    reject_reasons: &HashMap<String, &str>,
) -> String {
    let is_winner = signals.is_winning_entry(entry);
    // The runner-up bid is only disclosed to the winning custom audience;
    // every losing entry sees a zero bid.
    let highest_other_bid = if is_winner {
        signals.second_highest_bid
    } else {
        0.0
    };
    let made_highest_other_bid =
        is_winner && signals.second_highest_buyer.as_ref() == Some(&entry.buyer);

    template
        .replace(WINNING_BID_MACRO, &format_bid(signals.winning_bid))
        .replace(MADE_WINNING_BID_MACRO, bool_str(is_winner))
        .replace(
            HIGHEST_SCORING_OTHER_BID_MACRO,
            &format_bid(highest_other_bid),
        )
        .replace(
            MADE_HIGHEST_SCORING_OTHER_BID_MACRO,
            bool_str(made_highest_other_bid),
        )
        .replace(
            REJECT_REASON_MACRO,
            reject_reason_for(entry, reject_reasons),
        )
}

/// First recognized reject reason per custom audience, keyed by
/// `name:buyer`. An entry without its own reason inherits the reason another
/// entry (typically the seller's) recorded for the same custom audience.
fn collect_reject_reasons(entries: &[DebugReportEntry]) -> HashMap<String, &str> {
    let mut reasons = HashMap::new();
    for entry in entries {
        if let Some(reason) = entry.seller_reject_reason.as_deref()
            && is_recognized_reject_reason(reason)
        {
            reasons.entry(ca_key(entry)).or_insert(reason);
        }
    }
    reasons
}

fn reject_reason_for<'a>(
    entry: &'a DebugReportEntry,
    reject_reasons: &HashMap<String, &'a str>,
) -> &'a str {
    if let Some(reason) = entry.seller_reject_reason.as_deref()
        && is_recognized_reject_reason(reason)
    {
        return reason;
    }
    reject_reasons
        .get(&ca_key(entry))
        .copied()
        .unwrap_or(REJECT_REASON_NOT_AVAILABLE)
}

fn is_recognized_reject_reason(reason: &str) -> bool {
    RECOGNIZED_REJECT_REASONS.contains(&reason)
}

fn ca_key(entry: &DebugReportEntry) -> String {
    format!("{}:{}", entry.ca_name, entry.buyer)
}

/// Bids render with an explicit fractional part, `1.0` rather than `1`.
fn format_bid(bid: f64) -> String {
    format!("{bid:?}")
}

fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

fn validate(resolved: &str) -> Option<Url> {
    if resolved.is_empty() || resolved.len() >= MAX_URI_CHARS {
        return None;
    }
    let uri = Url::parse(resolved).ok()?;
    if uri.scheme() != "https" || uri.host_str().is_none() {
        return None;
    }
    Some(uri)
}

/// Truncate each ad tech's beacons to the first `cap` in processing order.
/// Grouping is by URI host, the authority that will receive the GET.
fn apply_per_ad_tech_cap(beacons: Vec<ResolvedBeacon>, cap: usize) -> Vec<ResolvedBeacon> {
    let mut by_host: IndexMap<String, Vec<ResolvedBeacon>> = IndexMap::new();
    for beacon in beacons {
        let host = beacon.uri.host_str().unwrap_or_default().to_string();
        let group = by_host.entry(host).or_default();
        if group.len() < cap {
            group.push(beacon);
        } else {
            counter!(BEACONS_DROPPED_CAPPED).increment(1);
        }
    }
    let emitted: Vec<ResolvedBeacon> = by_host.into_values().flatten().collect();
    counter!(BEACONS_EMITTED).increment(emitted.len() as u64);
    emitted
}
