use crate::{SchemaError, timeuuid};
use serde::{Deserialize, Serialize};
use std::{fmt, ops::RangeInclusive, str::FromStr};
use uuid::Uuid;

///
/// CONSTANTS
///

pub const NANOS_PER_HOUR: i64 = 3_600_000_000_000;
pub const NANOS_PER_DAY: i64 = 24 * NANOS_PER_HOUR;
pub const NANOS_PER_WEEK: i64 = 7 * NANOS_PER_DAY;

/// Average Gregorian month (365.2425 days / 12).
pub const NANOS_PER_MONTH: i64 = 2_629_746_000_000_000;

/// Shard id used by unsharded indexes and by ids with no embedded time.
pub const UNSHARDED_ID: i64 = 1;

///
/// ShardingStrategy
///
/// Maps a time-ordered primary key onto a shard id by dividing its embedded
/// timestamp into fixed-width buckets. Shard ids are monotonic non-decreasing
/// in key time.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(try_from = "StrategyRepr", into = "StrategyRepr")]
pub enum ShardingStrategy {
    #[default]
    None,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl ShardingStrategy {
    pub const ALL: [Self; 5] = [
        Self::None,
        Self::Hourly,
        Self::Daily,
        Self::Weekly,
        Self::Monthly,
    ];

    /// Bucket width in nanoseconds, `None` for the single-shard strategy.
    #[must_use]
    pub const fn bucket_nanos(self) -> Option<i64> {
        match self {
            Self::None => None,
            Self::Hourly => Some(NANOS_PER_HOUR),
            Self::Daily => Some(NANOS_PER_DAY),
            Self::Weekly => Some(NANOS_PER_WEEK),
            Self::Monthly => Some(NANOS_PER_MONTH),
        }
    }

    #[must_use]
    pub const fn is_sharded(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Shard id for a raw unix-nanosecond timestamp.
    #[must_use]
    pub const fn shard_of_nanos(self, unix_nanos: i64) -> i64 {
        match self.bucket_nanos() {
            Some(width) => unix_nanos.div_euclid(width),
            None => UNSHARDED_ID,
        }
    }

    #[must_use]
    pub const fn shard_of_millis(self, unix_millis: i64) -> i64 {
        self.shard_of_nanos(unix_millis.saturating_mul(1_000_000))
    }

    /// Shard id for a primary key. Keys with no embedded time always land
    /// on the unsharded id.
    #[must_use]
    pub fn shard_of(self, id: &Uuid) -> i64 {
        match timeuuid::unix_nanos(id) {
            Some(nanos) if self.is_sharded() => self.shard_of_nanos(nanos),
            _ => UNSHARDED_ID,
        }
    }

    /// Inclusive span of shard ids covering `[start, end]` (unix nanos).
    #[must_use]
    pub const fn shard_range(self, start_nanos: i64, end_nanos: i64) -> RangeInclusive<i64> {
        self.shard_of_nanos(start_nanos)..=self.shard_of_nanos(end_nanos)
    }

    /// First unix nanosecond inside the given shard.
    #[must_use]
    pub const fn start_nanos_of(self, shard_id: i64) -> Option<i64> {
        match self.bucket_nanos() {
            Some(width) => Some(shard_id.saturating_mul(width)),
            None => None,
        }
    }

    /// Name used in schema documents.
    #[must_use]
    pub const fn document_name(self) -> &'static str {
        match self {
            Self::None => "ShardingStrategyNone",
            Self::Hourly => "ShardingStrategyHourly",
            Self::Daily => "ShardingStrategyDaily",
            Self::Weekly => "ShardingStrategyWeekly",
            Self::Monthly => "ShardingStrategyMonthly",
        }
    }
}

impl fmt::Display for ShardingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.document_name())
    }
}

impl FromStr for ShardingStrategy {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let short = normalized
            .strip_prefix("shardingstrategy")
            .unwrap_or(&normalized);

        match short {
            "none" => Ok(Self::None),
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            _ => Err(SchemaError::UnknownShardingStrategy(s.to_string())),
        }
    }
}

///
/// StrategyRepr
/// Document form: `{"type": "ShardingStrategyDaily"}` or a bare name.
///

#[derive(Deserialize, Serialize)]
#[serde(untagged)]
enum StrategyRepr {
    Tagged {
        #[serde(rename = "type")]
        kind: String,
    },
    Name(String),
}

impl TryFrom<StrategyRepr> for ShardingStrategy {
    type Error = SchemaError;

    fn try_from(repr: StrategyRepr) -> Result<Self, Self::Error> {
        match repr {
            StrategyRepr::Tagged { kind } | StrategyRepr::Name(kind) => kind.parse(),
        }
    }
}

impl From<ShardingStrategy> for StrategyRepr {
    fn from(strategy: ShardingStrategy) -> Self {
        Self::Tagged {
            kind: strategy.document_name().to_string(),
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // 2024-03-10T00:30:00Z
    const MORNING: i64 = 1_710_030_600_000_000_000;

    fn id_at(nanos: i64) -> Uuid {
        timeuuid::from_unix_nanos(nanos, 0, [0; 6])
    }

    #[test]
    fn daily_splits_keys_twenty_five_hours_apart() {
        let a = id_at(MORNING);
        let b = id_at(MORNING + 25 * NANOS_PER_HOUR);

        assert_ne!(
            ShardingStrategy::Daily.shard_of(&a),
            ShardingStrategy::Daily.shard_of(&b)
        );
    }

    #[test]
    fn daily_keeps_keys_one_hour_apart_on_same_day_together() {
        let a = id_at(MORNING);
        let b = id_at(MORNING + NANOS_PER_HOUR);

        assert_eq!(
            ShardingStrategy::Daily.shard_of(&a),
            ShardingStrategy::Daily.shard_of(&b)
        );
    }

    #[test]
    fn unsharded_strategy_and_random_ids_map_to_single_shard() {
        assert_eq!(ShardingStrategy::None.shard_of(&id_at(MORNING)), UNSHARDED_ID);
        assert_eq!(ShardingStrategy::Hourly.shard_of(&Uuid::new_v4()), UNSHARDED_ID);
        assert_eq!(ShardingStrategy::None.shard_range(0, MORNING), 1..=1);
    }

    #[test]
    fn shard_range_spans_every_bucket_between_bounds() {
        let range = ShardingStrategy::Hourly.shard_range(MORNING, MORNING + 3 * NANOS_PER_HOUR);

        assert_eq!(range.clone().count(), 4);
        assert_eq!(
            ShardingStrategy::Hourly.start_nanos_of(*range.start()),
            Some(MORNING - MORNING.rem_euclid(NANOS_PER_HOUR))
        );
    }

    #[test]
    fn document_form_accepts_tagged_and_bare_names() {
        let tagged: ShardingStrategy =
            serde_json::from_str(r#"{"type": "ShardingStrategyMonthly"}"#).expect("tagged form");
        let bare: ShardingStrategy = serde_json::from_str(r#""weekly""#).expect("bare form");

        assert_eq!(tagged, ShardingStrategy::Monthly);
        assert_eq!(bare, ShardingStrategy::Weekly);
        assert_eq!(
            serde_json::to_string(&ShardingStrategy::Daily).expect("serialize"),
            r#"{"type":"ShardingStrategyDaily"}"#
        );
    }

    #[test]
    fn unknown_strategy_name_is_rejected() {
        let err = "ShardingStrategyYearly"
            .parse::<ShardingStrategy>()
            .expect_err("yearly is not supported");

        assert!(matches!(err, SchemaError::UnknownShardingStrategy(_)));
    }

    proptest! {
        #[test]
        fn shard_of_is_monotonic_in_key_time(
            a in 0i64..4_000_000_000_000_000_000,
            delta in 0i64..100_000_000_000_000_000,
        ) {
            let earlier = id_at(a);
            let later = id_at(a + delta);

            for strategy in ShardingStrategy::ALL {
                prop_assert_eq!(strategy.shard_of(&earlier), strategy.shard_of(&earlier));
                prop_assert!(strategy.shard_of(&earlier) <= strategy.shard_of(&later));
            }
        }
    }
}
