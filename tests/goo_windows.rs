//! Window timing and sync alignment tests driven by synthetic timestamps.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;

use streamgoo::config::GooConfig;
use streamgoo::goo::{find_sync, GooControl, GooEngine, GooType, SYNC_BYTE, TS_PACKET_SIZE};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn engine(goo_type: Option<GooType>, seed: u64) -> (GooEngine, Instant) {
    let cfg = GooConfig {
        factor: 10_000,
        goo_type,
        warmup: Duration::ZERO,
        pause: ms(500),
        duration: ms(1000),
    };
    let t0 = Instant::now();
    let control = Arc::new(GooControl::new(cfg.factor));
    (
        GooEngine::with_rng(control, &cfg, t0, StdRng::seed_from_u64(seed)),
        t0,
    )
}

/// Whether a packet at `t` got any goo.
fn goo_at(engine: &mut GooEngine, t: Instant) -> bool {
    engine.process(vec![0x10u8; 32], t).event.is_some()
}

#[test]
fn test_active_pause_active_cycle() {
    let (mut engine, t0) = engine(Some(GooType::ByteIncrement), 11);

    for t in (0..=1000).step_by(50) {
        assert!(goo_at(&mut engine, t0 + ms(t)), "expected goo at {t} ms");
    }
    for t in (1001..=1500).step_by(50) {
        assert!(!goo_at(&mut engine, t0 + ms(t)), "expected pause at {t} ms");
    }
    for t in (1501..=2500).step_by(50) {
        assert!(goo_at(&mut engine, t0 + ms(t)), "expected goo at {t} ms");
    }
    assert_eq!(engine.clock().current(), GooType::ByteIncrement);
}

#[test]
fn test_windows_reroll_random_variant() {
    let (mut engine, t0) = engine(None, 12);

    let mut seen = HashSet::new();
    let mut t = 0;
    for _ in 0..100 {
        // One packet per active window, one to cross into the pause
        goo_at(&mut engine, t0 + ms(t));
        seen.insert(engine.clock().current());
        t += 1001;
        goo_at(&mut engine, t0 + ms(t));
        t += 500;
    }
    assert!(seen.len() > 1, "variant never changed: {seen:?}");
}

#[test]
fn test_paused_factor_freezes_windows() {
    let t0 = Instant::now();
    let control = Arc::new(GooControl::new(10_000));
    control.set_factor(0);
    let cfg = GooConfig {
        factor: 10_000,
        goo_type: Some(GooType::ZeroPacket),
        warmup: Duration::ZERO,
        pause: ms(500),
        duration: ms(1000),
    };
    let mut engine =
        GooEngine::with_rng(Arc::clone(&control), &cfg, t0, StdRng::seed_from_u64(14));
    let before = engine.clock().clone();

    for t in [0u64, 1500, 10_000, 60_000] {
        let verdict = engine.process(vec![1, 2, 3], t0 + ms(t));
        assert_eq!(verdict.forward, Some(vec![1, 2, 3]));
        assert!(verdict.event.is_none());
    }
    assert_eq!(engine.clock(), &before);

    // Resuming picks the schedule up from where it was left
    control.toggle();
    assert!(!control.is_paused());
    let verdict = engine.process(vec![1, 2, 3], t0 + ms(60_001));
    assert!(verdict.event.is_none());
    assert_ne!(engine.clock(), &before);
}

#[test]
fn test_sync_offset_behind_rtp_prefix() {
    let mut data: Vec<u8> = (0..12u8).map(|i| i.wrapping_mul(31)).collect();
    for _ in 0..5 {
        let mut block = vec![0u8; TS_PACKET_SIZE];
        block[0] = SYNC_BYTE;
        data.extend_from_slice(&block);
    }
    assert_eq!(find_sync(&data, 0), Some(12));
}

#[test]
fn test_sync_not_found_without_stride() {
    let mut data = vec![0x00u8; 4 * TS_PACKET_SIZE];
    // Every candidate has at least one in-bounds stride landing on 0x00
    let last_checked = data.len() - TS_PACKET_SIZE;
    for i in (5..last_checked).step_by(97) {
        data[i] = SYNC_BYTE;
    }
    assert_eq!(find_sync(&data, 0), None);

    // A candidate in the final packet length has no stride left to check
    let tail = data.len() - 100;
    data[tail] = SYNC_BYTE;
    assert_eq!(find_sync(&data, 0), Some(tail));
}
