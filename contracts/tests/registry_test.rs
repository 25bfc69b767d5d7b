//! Integration tests for the auction registry: governance, factory
//! admission control, and pagination.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use gavel_contracts::{
    AuctionEvent, AuctionRegistry, Classified, ErrorClass, EventLog, RegistryConfig, RegistryError,
    RewardIssuer,
};
use gavel_protocol::{AssetId, EngineId, InMemoryLedger, Principal};

fn p(s: &str) -> Principal {
    Principal::new(s)
}

fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_750_000_000, 0).unwrap()
}

fn usdc() -> AssetId {
    AssetId::new("USDC")
}

fn setup(config: RegistryConfig) -> (AuctionRegistry, Arc<EventLog>) {
    let log = Arc::new(EventLog::new());
    let rewards = Arc::new(RewardIssuer::new(p("gov"), log.clone()));
    rewards.set_registry(&p("gov"), p("registry")).unwrap();
    let mut registry =
        AuctionRegistry::new(p("registry"), p("gov"), rewards, log.clone(), config).unwrap();
    registry
        .add_supported_asset(&p("gov"), Arc::new(InMemoryLedger::new(usdc())))
        .unwrap();
    log.drain();
    (registry, log)
}

fn create_n(registry: &mut AuctionRegistry, n: usize) -> Vec<EngineId> {
    (0..n)
        .map(|i| {
            let creator = p(&format!("creator-{}", i % 3));
            registry
                .create_auction(&creator, &usdc(), 3_600, p("beneficiary"), now())
                .unwrap()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Governance
// ---------------------------------------------------------------------------

#[test]
fn asset_lifecycle_emits_events() {
    let (mut registry, log) = setup(RegistryConfig::default());
    let dai = AssetId::new("dai");

    registry
        .add_supported_asset(&p("gov"), Arc::new(InMemoryLedger::new(dai.clone())))
        .unwrap();
    assert_eq!(registry.supported_assets(), vec![AssetId::new("DAI"), usdc()]);

    registry.remove_supported_asset(&p("gov"), &dai).unwrap();
    assert!(!registry.is_supported(&dai));

    assert_eq!(
        log.drain(),
        vec![
            AuctionEvent::AssetAdded { asset: dai.clone() },
            AuctionEvent::AssetRemoved { asset: dai },
        ]
    );
}

#[test]
fn removing_asset_keeps_existing_auctions_running() {
    let (mut registry, _) = setup(RegistryConfig::default());
    let id = registry
        .create_auction(&p("c"), &usdc(), 3_600, p("b"), now())
        .unwrap();
    registry.remove_supported_asset(&p("gov"), &usdc()).unwrap();

    assert!(registry.engine(&id).is_ok());
    let err = registry
        .create_auction(&p("c"), &usdc(), 3_600, p("b"), now())
        .unwrap_err();
    assert_eq!(err, RegistryError::UnsupportedAsset(usdc()));
    assert_eq!(registry.instance_count(), 1);
}

#[test]
fn pause_blocks_creation_only() {
    let (mut registry, log) = setup(RegistryConfig::default());
    let id = registry
        .create_auction(&p("c"), &usdc(), 3_600, p("b"), now())
        .unwrap();

    registry.set_paused(&p("gov"), true).unwrap();
    assert_eq!(
        registry.create_auction(&p("c"), &usdc(), 3_600, p("b"), now()),
        Err(RegistryError::CreationPaused)
    );
    assert!(registry.engine(&id).is_ok());

    registry.set_paused(&p("gov"), false).unwrap();
    assert!(registry
        .create_auction(&p("c"), &usdc(), 3_600, p("b"), now())
        .is_ok());

    let pauses: Vec<_> = log
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            AuctionEvent::PauseToggled { paused } => Some(paused),
            _ => None,
        })
        .collect();
    assert_eq!(pauses, vec![true, false]);
}

#[test]
fn ownership_transfer_hands_over_governance() {
    let (mut registry, _) = setup(RegistryConfig::default());
    registry.transfer_ownership(&p("gov"), p("dao")).unwrap();

    let err = registry.set_paused(&p("gov"), true).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Authorization);
    registry.set_paused(&p("dao"), true).unwrap();
    assert!(registry.is_paused());

    assert_eq!(
        registry.transfer_ownership(&p("dao"), Principal::null()),
        Err(RegistryError::InvalidOwner)
    );
}

#[test]
fn narrowed_bounds_apply_to_new_auctions() {
    let (mut registry, _) = setup(RegistryConfig::default());
    registry.set_duration_bounds(&p("gov"), 600, 1_200).unwrap();

    assert!(registry
        .create_auction(&p("c"), &usdc(), 3_600, p("b"), now())
        .is_err());
    assert!(registry
        .create_auction(&p("c"), &usdc(), 900, p("b"), now())
        .is_ok());
}

#[test]
fn invalid_config_is_refused() {
    let log = Arc::new(EventLog::new());
    let rewards = Arc::new(RewardIssuer::new(p("gov"), log.clone()));
    let config = RegistryConfig {
        min_duration_secs: 10,
        max_duration_secs: 5,
        ..RegistryConfig::default()
    };
    let err = AuctionRegistry::new(p("registry"), p("gov"), rewards, log, config).unwrap_err();
    assert_eq!(err.code(), "InvalidConfig");
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

#[test]
fn ids_are_unique_and_creator_tagged() {
    let (mut registry, log) = setup(RegistryConfig::default());
    let ids = create_n(&mut registry, 6);

    let mut sorted = ids.clone();
    sorted.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    sorted.dedup();
    assert_eq!(sorted.len(), 6);

    for (i, id) in ids.iter().enumerate() {
        assert_eq!(
            registry.instance_owner(id),
            Some(&p(&format!("creator-{}", i % 3)))
        );
    }

    let created = log
        .drain()
        .into_iter()
        .filter(|e| e.kind() == "instance_created")
        .count();
    assert_eq!(created, 6);
}

#[test]
fn failed_creation_appends_nothing() {
    let (mut registry, log) = setup(RegistryConfig::default());
    let err = registry
        .create_auction(&p("c"), &AssetId::new("WBTC"), 3_600, p("b"), now())
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Admission);
    assert_eq!(registry.instance_count(), 0);
    assert!(log.is_empty());
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[test]
fn pages_are_contiguous_and_ordered() {
    let (mut registry, _) = setup(RegistryConfig::default());
    let ids = create_n(&mut registry, 25);

    let mut collected = Vec::new();
    let mut start = 0;
    while start < registry.instance_count() {
        let page = registry.get_instances(start, 7).unwrap();
        assert!(page.len() <= 7);
        start += page.len();
        collected.extend(page);
    }
    assert_eq!(collected, ids);
}

#[test]
fn final_page_is_truncated() {
    let (mut registry, _) = setup(RegistryConfig::default());
    let ids = create_n(&mut registry, 5);

    assert_eq!(registry.get_instances(3, 100).unwrap(), ids[3..].to_vec());
    assert_eq!(registry.get_instances(4, 1).unwrap(), vec![ids[4].clone()]);
    assert_eq!(registry.get_instances(0, 0).unwrap(), Vec::<EngineId>::new());
    assert_eq!(
        registry.get_instances(5, 1),
        Err(RegistryError::StartOutOfBounds { start: 5, len: 5 })
    );
}

#[test]
fn oversized_batch_rejected_regardless_of_size() {
    let (mut registry, _) = setup(RegistryConfig::default());
    for n in [0, 3] {
        create_n(&mut registry, n);
        let err = registry.get_instances(0, 101).unwrap_err();
        assert_eq!(
            err,
            RegistryError::BatchTooLarge {
                requested: 101,
                max: 100
            }
        );
    }
}

#[test]
fn page_cap_follows_config() {
    let config = RegistryConfig {
        max_page_size: 2,
        ..RegistryConfig::default()
    };
    let (mut registry, _) = setup(config);
    create_n(&mut registry, 4);

    assert_eq!(registry.get_instances(0, 2).unwrap().len(), 2);
    assert!(matches!(
        registry.get_instances(0, 3),
        Err(RegistryError::BatchTooLarge { max: 2, .. })
    ));
}
