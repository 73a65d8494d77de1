//! Tests for the Ban Decision Engine

use super::*;
use crate::domain::{Blocklist, IpUploadCheck, ProgressUploadCheck, RelativeUploadCheck};

const MIB_BYTES: i64 = 1024 * 1024;
const GIB: i64 = 1024 * MIB_BYTES;
const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

// =============================================================================
// TEST HELPERS
// =============================================================================

fn config_for_testing() -> EngineConfig {
    EngineConfig {
        ban_method: BanMethod::Extended,
        ban_duration: 3_600,
        clean_interval: 60,
        ..Default::default()
    }
}

fn engine_with(configure: impl FnOnce(&mut EngineConfig)) -> DecisionEngine {
    let mut config = config_for_testing();
    configure(&mut config);
    DecisionEngine::new(config)
}

fn peer(ip: &str, port: u16, client: &str) -> PeerObservation {
    PeerObservation::new(ip, port, client, 0.5, 0)
}

fn uploading_peer(ip: &str, port: u16, progress: f64, uploaded_bytes: i64) -> PeerObservation {
    PeerObservation::new(ip, port, "qBittorrent/4.6.2", progress, uploaded_bytes)
}

fn at(secs: u64) -> Timestamp {
    Timestamp::new(secs)
}

// =============================================================================
// TEST GROUP 1: Malformed Records
// =============================================================================

#[test]
fn test_malformed_peers_are_skipped() {
    let mut engine = engine_with(|c| {
        c.blocklist = Blocklist::compile(&[".*"]).0;
        c.client_stat_interval = 60;
    });

    let cases = [
        (peer("", 1, "client"), MalformedReason::EmptyIp),
        (peer("8.8.8.8", 1, ""), MalformedReason::EmptyClientName),
        (peer("not-an-ip", 1, "client"), MalformedReason::UnparsableIp),
        (peer("192.168.1.10", 1, "client"), MalformedReason::PrivateIp),
        (peer("10.0.0.1", 1, "client"), MalformedReason::PrivateIp),
        (peer("fd12::1", 1, "client"), MalformedReason::PrivateIp),
    ];

    for (observation, reason) in cases {
        assert_eq!(
            engine.evaluate_peer(&observation, HASH, GIB, at(1)),
            PeerVerdict::Malformed(reason)
        );
    }

    assert!(engine.ban_table().is_empty());
    assert!(engine.ip_window().current().is_empty());
    assert!(engine.peer_window().current().is_empty());
    assert!(engine.client_stats().current().is_empty());
}

// =============================================================================
// TEST GROUP 2: Per-Peer Rules
// =============================================================================

#[test]
fn test_clean_peer_is_recorded_into_windows() {
    let mut engine = engine_with(|c| c.client_stat_interval = 60);

    let verdict = engine.evaluate_peer(&uploading_peer("8.8.8.8", 6881, 0.3, 42), HASH, GIB, at(5));

    assert_eq!(verdict, PeerVerdict::Ok);
    assert_eq!(
        engine.ip_window().current()["8.8.8.8"].torrent_uploaded[HASH],
        42
    );
    let entry = &engine.peer_window().current()["8.8.8.8"];
    assert!(entry.ports_seen.contains(&6881));
    assert_eq!(entry.uploaded_bytes, 42);
    assert_eq!(entry.progress, 0.3);
    assert_eq!(entry.last_seen_at, at(5));
    assert!(engine.client_stats().current()["8.8.8.8"]
        .client_names_seen
        .contains("qBittorrent/4.6.2"));
}

#[test]
fn test_peer_window_merges_ports_and_keeps_latest_values() {
    let mut engine = engine_with(|_| {});

    engine.evaluate_peer(&uploading_peer("8.8.8.8", 1000, 0.1, 10), HASH, GIB, at(1));
    engine.evaluate_peer(&uploading_peer("8.8.8.8", 2000, 0.2, 20), "other", GIB, at(2));

    let entry = &engine.peer_window().current()["8.8.8.8"];
    assert_eq!(entry.ports_seen.len(), 2);
    assert_eq!(entry.uploaded_bytes, 20);
    assert_eq!(entry.last_seen_at, at(2));
    assert_eq!(engine.ip_window().current()["8.8.8.8"].torrent_uploaded.len(), 2);
}

#[test]
fn test_blocklist_bans_exact_port_under_extended_method() {
    let mut engine = engine_with(|c| c.blocklist = Blocklist::compile(&["xunlei", "thunder"]).0);

    let verdict = engine.evaluate_peer(&peer("8.8.8.8", 6881, "Thunder 5.1"), HASH, GIB, at(1));

    assert_eq!(
        verdict,
        PeerVerdict::BannedClient {
            pattern: "thunder".into()
        }
    );
    let entry = engine.ban_table().get("8.8.8.8").unwrap();
    assert_eq!(entry.selector, PortSelector::ExactPort(6881));
    assert!(engine.peer_window().current().is_empty());
}

#[test]
fn test_blocklist_bans_wildcard_under_legacy_method() {
    let mut engine = engine_with(|c| {
        c.ban_method = BanMethod::Legacy;
        c.blocklist = Blocklist::compile(&["xunlei"]).0;
    });

    engine.evaluate_peer(&peer("8.8.8.8", 6881, "XunLei"), HASH, GIB, at(1));

    assert!(engine.ban_table().is_blocked("8.8.8.8", Some(1)));
}

#[test]
fn test_progress_rule_short_circuits_blocklist() {
    let mut engine = engine_with(|c| {
        c.blocklist = Blocklist::compile(&["qbittorrent"]).0;
        c.progress_upload = ProgressUploadCheck {
            enabled: true,
            start_percent: 2.0,
            start_mb: 0.0,
            anti_error_ratio: 5.0,
        };
    });

    let verdict = engine.evaluate_peer(
        &uploading_peer("8.8.8.8", 6881, 0.01, 6 * GIB),
        HASH,
        100 * GIB,
        at(1),
    );

    assert_eq!(verdict, PeerVerdict::BannedProgress);
    assert_eq!(engine.ban_table().len(), 1);
}

#[test]
fn test_progress_rule_disabled_does_nothing() {
    let mut engine = engine_with(|_| {});

    let verdict = engine.evaluate_peer(
        &uploading_peer("8.8.8.8", 6881, 0.01, 6 * GIB),
        HASH,
        100 * GIB,
        at(1),
    );

    assert_eq!(verdict, PeerVerdict::Ok);
}

#[test]
fn test_already_banned_peer_refreshes_ttl() {
    let mut engine = engine_with(|c| c.blocklist = Blocklist::compile(&["bad"]).0);
    engine.evaluate_peer(&peer("8.8.8.8", 6881, "bad"), HASH, GIB, at(10));

    let verdict = engine.evaluate_peer(&peer("8.8.8.8", 6881, "bad"), HASH, GIB, at(500));

    assert_eq!(verdict, PeerVerdict::AlreadyBanned(PortSelector::ExactPort(6881)));
    assert_eq!(engine.ban_table().get("8.8.8.8").unwrap().banned_at, at(500));
}

#[test]
fn test_exact_port_ban_does_not_block_other_ports() {
    let mut engine = engine_with(|c| c.blocklist = Blocklist::compile(&["bad"]).0);
    engine.evaluate_peer(&peer("8.8.8.8", 6881, "bad"), HASH, GIB, at(10));

    let verdict = engine.evaluate_peer(&peer("8.8.8.8", 7000, "good"), HASH, GIB, at(20));

    assert_eq!(verdict, PeerVerdict::Ok);
    assert_eq!(engine.ban_table().get("8.8.8.8").unwrap().banned_at, at(10));
}

#[test]
fn test_uppercase_ipv6_is_normalized() {
    let mut engine = engine_with(|c| c.blocklist = Blocklist::compile(&["bad"]).0);

    engine.evaluate_peer(&peer("2001:DB8::A", 1, "bad"), HASH, GIB, at(1));

    assert!(engine.ban_table().contains("2001:db8::a"));
    assert!(engine.is_blocked("2001:db8::A", Some(1), at(2), false));
}

#[test]
fn test_evaluation_is_idempotent_for_identical_state() {
    let mut first = engine_with(|c| {
        c.blocklist = Blocklist::compile(&["bad"]).0;
        c.progress_upload.enabled = true;
    });
    first.evaluate_peer(&peer("1.1.1.1", 1, "client"), HASH, GIB, at(1));
    let mut second = first.clone();

    for observation in [
        peer("8.8.8.8", 1, "client"),
        peer("9.9.9.9", 2, "bad"),
        uploading_peer("4.4.4.4", 3, 0.0, GIB),
        peer("", 4, "client"),
    ] {
        assert_eq!(
            first.evaluate_peer(&observation, HASH, GIB, at(5)),
            second.evaluate_peer(&observation, HASH, GIB, at(5))
        );
    }
}

// =============================================================================
// TEST GROUP 3: Window Checks
// =============================================================================

fn ports_engine() -> DecisionEngine {
    engine_with(|c| {
        c.max_ports_per_ip = 3;
        c.relative_upload.window_interval = 60;
    })
}

#[test]
fn test_too_many_ports_bans_wildcard() {
    let mut engine = ports_engine();
    assert!(engine.check_all_peer(at(0)).is_empty());

    for port in [1000, 1001, 1002, 1003] {
        engine.evaluate_peer(&peer("8.8.8.8", port, "client"), HASH, GIB, at(10));
    }
    let bans = engine.check_all_peer(at(61));

    assert_eq!(bans.len(), 1);
    assert_eq!(bans[0].reason, BanReason::TooManyPorts { ports: 4 });
    assert_eq!(
        engine.ban_table().get("8.8.8.8").unwrap().selector,
        PortSelector::Wildcard
    );
}

#[test]
fn test_port_count_at_limit_is_not_banned() {
    let mut engine = ports_engine();
    engine.check_all_peer(at(0));

    for port in [1000, 1001, 1002] {
        engine.evaluate_peer(&peer("8.8.8.8", port, "client"), HASH, GIB, at(10));
    }

    assert!(engine.check_all_peer(at(61)).is_empty());
    assert!(engine.ban_table().is_empty());
}

#[test]
fn test_window_checks_wait_for_their_interval() {
    let mut engine = ports_engine();
    engine.check_all_peer(at(0));
    for port in [1000, 1001, 1002, 1003] {
        engine.evaluate_peer(&peer("8.8.8.8", port, "client"), HASH, GIB, at(10));
    }

    assert!(engine.check_all_peer(at(60)).is_empty());
    assert_eq!(engine.peer_window().current().len(), 1);
}

#[test]
fn test_window_checks_skip_ips_with_any_ban() {
    let mut engine = engine_with(|c| {
        c.max_ports_per_ip = 1;
        c.relative_upload.window_interval = 60;
        c.blocklist = Blocklist::compile(&["bad"]).0;
    });
    engine.check_all_peer(at(0));

    engine.evaluate_peer(&peer("8.8.8.8", 9999, "bad"), HASH, GIB, at(1));
    engine.evaluate_peer(&peer("8.8.8.8", 1000, "client"), HASH, GIB, at(1));
    engine.evaluate_peer(&peer("8.8.8.8", 1001, "client"), HASH, GIB, at(1));

    assert!(engine.check_all_peer(at(61)).is_empty());
    assert_eq!(
        engine.ban_table().get("8.8.8.8").unwrap().selector,
        PortSelector::ExactPort(9999)
    );
}

#[test]
fn test_ip_increment_needs_baseline_then_bans() {
    let mut engine = engine_with(|c| {
        c.ip_upload = IpUploadCheck {
            enabled: true,
            increment_mb: 100.0,
            window_interval: 60,
        };
    });
    engine.check_all_ip(at(0));

    engine.evaluate_peer(&uploading_peer("8.8.8.8", 1, 0.5, 500 * MIB_BYTES), HASH, GIB, at(10));
    assert!(engine.check_all_ip(at(61)).is_empty(), "first window is the baseline");

    engine.evaluate_peer(&uploading_peer("8.8.8.8", 1, 0.5, 550 * MIB_BYTES), HASH, GIB, at(70));
    engine.evaluate_peer(&uploading_peer("8.8.8.8", 1, 0.5, 80 * MIB_BYTES), "other", GIB, at(70));
    let bans = engine.check_all_ip(at(122));

    assert_eq!(bans.len(), 1);
    assert_eq!(bans[0].ip, "8.8.8.8");
    assert_eq!(bans[0].selector, PortSelector::Wildcard);
    assert_eq!(
        bans[0].reason,
        BanReason::IpUploadIncrement {
            increment_mb: 130.0
        }
    );
    assert!(engine.ban_table().is_blocked("8.8.8.8", None));
}

#[test]
fn test_ip_increment_below_threshold_is_not_banned() {
    let mut engine = engine_with(|c| {
        c.ip_upload = IpUploadCheck {
            enabled: true,
            increment_mb: 100.0,
            window_interval: 60,
        };
    });
    engine.check_all_ip(at(0));
    engine.evaluate_peer(&uploading_peer("8.8.8.8", 1, 0.5, 500 * MIB_BYTES), HASH, GIB, at(10));
    engine.check_all_ip(at(61));
    engine.evaluate_peer(&uploading_peer("8.8.8.8", 1, 0.5, 590 * MIB_BYTES), HASH, GIB, at(70));

    assert!(engine.check_all_ip(at(122)).is_empty());
}

#[test]
fn test_relative_upload_bans_with_relative_selector() {
    let mut engine = engine_with(|c| {
        c.relative_upload = RelativeUploadCheck {
            enabled: true,
            start_mb: 10.0,
            start_percent: 1.0,
            anti_error_ratio: 3.0,
            window_interval: 60,
        };
    });
    engine.check_all_peer(at(0));

    engine.evaluate_peer(&uploading_peer("8.8.8.8", 1, 0.0, 20 * MIB_BYTES), HASH, GIB, at(10));
    assert!(engine.check_all_peer(at(61)).is_empty());

    engine.evaluate_peer(&uploading_peer("8.8.8.8", 1, 0.0, 50 * MIB_BYTES), HASH, GIB, at(70));
    let bans = engine.check_all_peer(at(122));

    assert_eq!(bans.len(), 1);
    assert_eq!(bans[0].selector, PortSelector::RelativeUploadWildcard);
    assert_eq!(
        engine.ban_table().matching("8.8.8.8", Some(1)),
        Some(PortSelector::RelativeUploadWildcard)
    );
}

#[test]
fn test_relative_error_margin_prevents_ban() {
    let mut engine = engine_with(|c| {
        c.relative_upload = RelativeUploadCheck {
            enabled: true,
            start_mb: 10.0,
            start_percent: 1.0,
            anti_error_ratio: 3.0,
            window_interval: 60,
        };
    });
    engine.check_all_peer(at(0));
    engine.evaluate_peer(&uploading_peer("8.8.8.8", 1, 0.1, MIB_BYTES), HASH, GIB, at(10));
    engine.check_all_peer(at(61));
    engine.evaluate_peer(&uploading_peer("8.8.8.8", 1, 0.5, 50 * MIB_BYTES), HASH, GIB, at(70));

    assert!(engine.check_all_peer(at(122)).is_empty());
}

#[test]
fn test_rotation_only_clears_rotated_window() {
    let mut engine = engine_with(|c| {
        c.client_stat_interval = 1_000;
        c.ip_upload.window_interval = 60;
        c.relative_upload.window_interval = 500;
        c.blocklist = Blocklist::compile(&["bad"]).0;
    });
    engine.check_all_ip(at(0));
    engine.check_all_peer(at(0));
    engine.rotate_client_stats(at(0));

    engine.evaluate_peer(&peer("9.9.9.9", 1, "bad"), HASH, GIB, at(1));
    engine.evaluate_peer(&peer("8.8.8.8", 1, "client"), HASH, GIB, at(1));
    engine.check_all_ip(at(61));
    engine.check_all_peer(at(61));
    engine.rotate_client_stats(at(61));

    assert!(engine.ip_window().current().is_empty());
    assert!(engine.ip_window().last().contains_key("8.8.8.8"));
    assert!(engine.peer_window().current().contains_key("8.8.8.8"));
    assert!(engine.client_stats().current().contains_key("8.8.8.8"));
    assert!(engine.ban_table().contains("9.9.9.9"));
}

#[test]
fn test_client_stat_report_lists_multi_client_ips() {
    let mut engine = engine_with(|c| c.client_stat_interval = 30);
    assert!(engine.rotate_client_stats(at(0)).is_none());

    engine.evaluate_peer(&peer("8.8.8.8", 1, "qBittorrent/4.6"), HASH, GIB, at(1));
    engine.evaluate_peer(&peer("8.8.8.8", 2, "Transmission 4.0"), HASH, GIB, at(1));
    engine.evaluate_peer(&peer("9.9.9.9", 1, "Deluge"), HASH, GIB, at(1));

    let report = engine.rotate_client_stats(at(31)).unwrap();

    assert_eq!(report.ips_seen, 2);
    assert_eq!(
        report.multi_client_ips,
        vec![(
            "8.8.8.8".to_string(),
            vec!["Transmission 4.0".to_string(), "qBittorrent/4.6".to_string()]
        )]
    );
    assert!(engine.client_stats().current().is_empty());
}

#[test]
fn test_client_stats_disabled() {
    let mut engine = engine_with(|c| c.client_stat_interval = 0);
    engine.evaluate_peer(&peer("8.8.8.8", 1, "client"), HASH, GIB, at(1));

    assert!(engine.rotate_client_stats(at(10_000)).is_none());
    assert!(engine.client_stats().current().is_empty());
}

// =============================================================================
// TEST GROUP 4: TTL Expiry
// =============================================================================

#[test]
fn test_clear_expired_respects_clean_interval() {
    let mut engine = engine_with(|c| c.blocklist = Blocklist::compile(&["bad"]).0);
    engine.evaluate_peer(&peer("8.8.8.8", 1, "bad"), HASH, GIB, at(0));

    assert_eq!(engine.clear_expired(at(100)), Some(0));
    assert_eq!(engine.clear_expired(at(150)), None);
    assert_eq!(engine.clear_expired(at(3_601)), Some(1));
    assert!(engine.ban_table().is_empty());
}

#[test]
fn test_clear_expired_every_call_when_interval_disabled() {
    let mut engine = engine_with(|c| c.clean_interval = 0);

    assert_eq!(engine.clear_expired(at(1)), Some(0));
    assert_eq!(engine.clear_expired(at(1)), Some(0));
}

#[test]
fn test_clear_expired_boundary() {
    let mut engine = engine_with(|c| {
        c.clean_interval = 0;
        c.blocklist = Blocklist::compile(&["bad"]).0;
    });
    let now = 10_000;
    let ban_duration = engine.config().ban_duration;
    engine.evaluate_peer(&peer("1.1.1.1", 1, "bad"), HASH, GIB, at(now - ban_duration - 1));
    engine.evaluate_peer(&peer("2.2.2.2", 1, "bad"), HASH, GIB, at(now - ban_duration + 1));

    assert_eq!(engine.clear_expired(at(now)), Some(1));
    assert!(!engine.ban_table().contains("1.1.1.1"));
    assert!(engine.ban_table().contains("2.2.2.2"));
}
