//! Terminal walkthrough of a Gavel auction from whitelist to settlement.
//!
//! Sets up a registry and a reward issuer, lists one auction, plays out a
//! last-minute bidding war that triggers the anti-snipe extension, then
//! settles and prints the final balances.
//!
//! Run with:
//!   cargo run -p gavel-contracts --example auction_walkthrough

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use gavel_contracts::{
    AuctionRegistry, AuctionStatus, Classified, EventLog, RegistryConfig, RewardIssuer,
};
use gavel_protocol::config::{REWARD_DECIMALS, REWARD_UNIT};
use gavel_protocol::{AssetId, InMemoryLedger, Principal};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn section(num: u32, title: &str) {
    println!();
    println!("{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]========================================{RESET}");
    println!("{BOLD}{WHITE}  {title}{RESET}");
}

fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn rejected(text: &str) {
    println!("{RED}  [REJECTED] {text}{RESET}");
}

fn info(label: &str, value: &str) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn clock(start: DateTime<Utc>, at: DateTime<Utc>) -> String {
    format!("t+{}s", (at - start).num_seconds())
}

fn credits(raw: u64) -> String {
    let unit = REWARD_UNIT;
    format!("{}.{:0width$}", raw / unit, raw % unit, width = REWARD_DECIMALS as usize)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let start = Utc.timestamp_opt(1_750_000_000, 0).unwrap();
    let at = |secs: i64| start + Duration::seconds(secs);

    let gov = Principal::new("gov");
    let alice = Principal::new("alice");
    let bob = Principal::new("bob");
    let seller = Principal::new("seller");
    let treasury = Principal::new("treasury");

    // -----------------------------------------------------------------------
    // Step 1: Bootstrap
    // -----------------------------------------------------------------------

    section(1, "Registry and reward issuer");

    let log = Arc::new(EventLog::new());
    let rewards = Arc::new(RewardIssuer::new(gov.clone(), log.clone()));
    rewards
        .set_registry(&gov, Principal::new("registry"))
        .expect("owner binds registry");

    let mut registry = AuctionRegistry::new(
        Principal::new("registry"),
        gov.clone(),
        rewards.clone(),
        log.clone(),
        RegistryConfig::default(),
    )
    .expect("default config is valid");

    let usdc = Arc::new(InMemoryLedger::new(AssetId::new("USDC")));
    registry
        .add_supported_asset(&gov, usdc.clone())
        .expect("fresh ledger passes probe");
    success("USDC whitelisted");
    let bounds = registry.duration_bounds();
    info("Duration bounds", &format!("{}s ..= {}s", bounds.min_secs, bounds.max_secs));

    // -----------------------------------------------------------------------
    // Step 2: List an auction
    // -----------------------------------------------------------------------

    section(2, "Seller lists a one-hour auction");

    let id = registry
        .create_auction(&seller, &AssetId::new("USDC"), 3_600, treasury.clone(), start)
        .expect("valid listing");
    info("Engine", id.as_str());
    info("Deadline", &clock(start, registry.engine(&id).expect("just created").end_time()));

    for (who, amount) in [(&alice, 1_000_u64), (&bob, 1_000)] {
        usdc.mint(who, amount).expect("faucet");
        usdc.approve(who, &id.as_principal(), amount);
    }
    success("Alice and Bob funded and approved the engine");

    // -----------------------------------------------------------------------
    // Step 3: Bidding war
    // -----------------------------------------------------------------------

    section(3, "Bidding war");

    let plan: [(&Principal, u64, i64); 5] = [
        (&alice, 100, 0),
        (&bob, 100, 60),
        (&bob, 150, 3_350),
        (&alice, 200, 3_640),
        (&bob, 250, 3_930),
    ];

    for (who, amount, secs) in plan {
        match registry.bid(&id, who, amount, at(secs)) {
            Ok(receipt) => {
                success(&format!("{} {who} bids {amount}", clock(start, at(secs))));
                if let Some(refund) = receipt.refund {
                    println!("{DIM}       refunded {} to {}{RESET}", refund.amount, refund.recipient);
                }
                if receipt.extended {
                    println!(
                        "{DIM}       anti-snipe: deadline moved to {}{RESET}",
                        clock(start, receipt.end_time)
                    );
                }
            }
            Err(e) => rejected(&format!("{} {who} bids {amount}: {} ({e})", clock(start, at(secs)), e.code())),
        }
    }

    // -----------------------------------------------------------------------
    // Step 4: Settlement
    // -----------------------------------------------------------------------

    section(4, "Settlement");

    let engine = registry.engine(&id).expect("exists");
    let end = engine.end_time();
    info("Status at old deadline", &engine.status_at(at(3_600)).to_string());

    if let Err(e) = registry.settle(&id, end - Duration::seconds(1)) {
        rejected(&format!("early settle: {}", e.code()));
    }

    let receipt = registry.settle(&id, end).expect("deadline reached");
    success(&format!("{} paid {} to {}", receipt.winner, receipt.amount, receipt.beneficiary));

    if let Err(e) = registry.settle(&id, end + Duration::seconds(1)) {
        rejected(&format!("second settle: {}", e.code()));
    }
    assert_eq!(
        registry.engine(&id).expect("exists").status_at(end),
        AuctionStatus::Settled
    );

    // -----------------------------------------------------------------------
    // Step 5: Final balances
    // -----------------------------------------------------------------------

    section(5, "Final balances");

    for (name, who) in [("alice", &alice), ("bob", &bob), ("treasury", &treasury)] {
        println!(
            "  {BOLD}{name:<10}{RESET} {WHITE}{:>6} USDC{RESET}  {DIM}{} credits{RESET}",
            usdc.balance(who),
            credits(rewards.balance_of(who))
        );
    }
    println!();
    info("Events emitted", &log.len().to_string());
}
