//! Version 1 (time-based) UUID helpers.
//!
//! Time-ordered identifiers embed a 60-bit count of 100ns intervals since the
//! Gregorian calendar reform. Sharding strategies bucket on that embedded
//! time, and the change log orders entries by it.

use std::{
    cmp::Ordering,
    sync::{
        LazyLock,
        atomic::{AtomicU64, Ordering as AtomicOrdering},
    },
    time::{SystemTime, UNIX_EPOCH},
};
use uuid::Uuid;

///
/// CONSTANTS
///

/// 100ns intervals between 1582-10-15 and 1970-01-01.
pub const GREGORIAN_OFFSET_TICKS: u64 = 0x01B2_1DD2_1381_4000;

const NANOS_PER_TICK: i64 = 100;
const MAX_TICKS: u64 = (1 << 60) - 1;

static GENERATOR: LazyLock<TimeUuidGenerator> = LazyLock::new(TimeUuidGenerator::random);

/// Generate a fresh time-ordered id from the process-wide generator.
#[must_use]
pub fn generate() -> Uuid {
    GENERATOR.generate()
}

/// Build a version 1 UUID for an exact unix time.
#[must_use]
pub fn from_unix_nanos(nanos: i64, clock_seq: u16, node: [u8; 6]) -> Uuid {
    from_ticks(ticks_from_unix_nanos(nanos), clock_seq, node)
}

/// Smallest time-ordered id for the given unix time.
#[must_use]
pub fn min_for_unix_nanos(nanos: i64) -> Uuid {
    from_unix_nanos(nanos, 0, [0; 6])
}

/// Largest time-ordered id for the given unix time.
#[must_use]
pub fn max_for_unix_nanos(nanos: i64) -> Uuid {
    from_unix_nanos(nanos, 0x3FFF, [0xFF; 6])
}

#[must_use]
pub fn min_for_unix_millis(millis: i64) -> Uuid {
    min_for_unix_nanos(millis.saturating_mul(1_000_000))
}

#[must_use]
pub fn max_for_unix_millis(millis: i64) -> Uuid {
    // the last tick inside the millisecond
    max_for_unix_nanos(
        millis
            .saturating_mul(1_000_000)
            .saturating_add(1_000_000 - NANOS_PER_TICK),
    )
}

#[must_use]
pub fn is_time_based(id: &Uuid) -> bool {
    id.get_version_num() == 1
}

/// Embedded timestamp as unix nanoseconds, or `None` for non-v1 ids.
#[must_use]
pub fn unix_nanos(id: &Uuid) -> Option<i64> {
    let ticks = ticks(id)?;
    let since_epoch = i128::from(ticks) - i128::from(GREGORIAN_OFFSET_TICKS);

    i64::try_from(since_epoch * i128::from(NANOS_PER_TICK)).ok()
}

#[must_use]
pub fn unix_millis(id: &Uuid) -> Option<i64> {
    unix_nanos(id).map(|n| n.div_euclid(1_000_000))
}

/// Embedded timestamp in microseconds, the unit the store uses for write
/// timestamps.
#[must_use]
pub fn unix_micros(id: &Uuid) -> Option<i64> {
    unix_nanos(id).map(|n| n.div_euclid(1_000))
}

/// Store ordering for time-ordered ids: embedded time first, then raw bytes.
#[must_use]
pub fn compare(a: &Uuid, b: &Uuid) -> Ordering {
    ticks(a)
        .cmp(&ticks(b))
        .then_with(|| a.as_bytes().cmp(b.as_bytes()))
}

fn ticks(id: &Uuid) -> Option<u64> {
    if !is_time_based(id) {
        return None;
    }

    let (time_low, time_mid, time_hi, _) = id.as_fields();
    let ticks = (u64::from(time_hi & 0x0FFF) << 48)
        | (u64::from(time_mid) << 32)
        | u64::from(time_low);

    Some(ticks)
}

fn ticks_from_unix_nanos(nanos: i64) -> u64 {
    let ticks = i128::from(nanos.div_euclid(NANOS_PER_TICK)) + i128::from(GREGORIAN_OFFSET_TICKS);

    u64::try_from(ticks.clamp(0, i128::from(MAX_TICKS))).unwrap_or(MAX_TICKS)
}

#[expect(clippy::cast_possible_truncation)]
fn from_ticks(ticks: u64, clock_seq: u16, node: [u8; 6]) -> Uuid {
    let time_low = (ticks & 0xFFFF_FFFF) as u32;
    let time_mid = ((ticks >> 32) & 0xFFFF) as u16;
    let time_hi = (((ticks >> 48) & 0x0FFF) as u16) | (1 << 12);

    let mut tail = [0u8; 8];
    tail[0] = (((clock_seq >> 8) & 0x3F) as u8) | 0x80;
    tail[1] = (clock_seq & 0xFF) as u8;
    tail[2..].copy_from_slice(&node);

    Uuid::from_fields(time_low, time_mid, time_hi, &tail)
}

///
/// TimeUuidGenerator
///
/// Monotonic version 1 generator. When the clock stalls or steps backward the
/// tick is advanced past the previous one instead, so ids from one generator
/// are strictly increasing.
///

#[derive(Debug)]
pub struct TimeUuidGenerator {
    last_tick: AtomicU64,
    clock_seq: u16,
    node: [u8; 6],
}

impl TimeUuidGenerator {
    #[must_use]
    pub const fn new(clock_seq: u16, node: [u8; 6]) -> Self {
        Self {
            last_tick: AtomicU64::new(0),
            clock_seq: clock_seq & 0x3FFF,
            node,
        }
    }

    /// Generator with a random clock sequence and a random multicast node id.
    #[must_use]
    pub fn random() -> Self {
        let bytes = *Uuid::new_v4().as_bytes();
        let clock_seq = u16::from_be_bytes([bytes[0], bytes[1]]);

        let mut node = [0u8; 6];
        node.copy_from_slice(&bytes[10..16]);
        node[0] |= 0x01;

        Self::new(clock_seq, node)
    }

    #[must_use]
    pub fn generate(&self) -> Uuid {
        self.generate_at(now_unix_nanos())
    }

    /// Generate for an explicit wall-clock time, still honouring monotonicity.
    #[must_use]
    pub fn generate_at(&self, unix_nanos: i64) -> Uuid {
        let wanted = ticks_from_unix_nanos(unix_nanos);
        let mut last = self.last_tick.load(AtomicOrdering::Relaxed);

        loop {
            let next = if wanted > last { wanted } else { last + 1 };

            match self.last_tick.compare_exchange_weak(
                last,
                next,
                AtomicOrdering::AcqRel,
                AtomicOrdering::Relaxed,
            ) {
                Ok(_) => return from_ticks(next, self.clock_seq, self.node),
                Err(current) => last = current,
            }
        }
    }
}

/// Current wall-clock time in unix nanoseconds.
#[must_use]
pub fn now_unix_nanos() -> i64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX)
}

///
/// TESTS
///
