//! # Rate Resolution
//!
//! Finds the rate of a tax type in effect on a date.
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  rate_as_of(type, date)                                                 │
//! │                                                                         │
//! │  1. latest[type] cached and effective_from <= date ──► return it        │
//! │  2. load rates of type, effective_from DESC                             │
//! │        │  head row ──► latest[type]                                      │
//! │        │  each scanned row ──► by_id[row.id]                             │
//! │        ▼                                                                 │
//! │     first row with effective_from <= date ──► return its rate           │
//! │  3. nothing qualifies ──► 0%                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `latest[type]` only ever holds the newest row of the type. A lookup for
//! an older date therefore never leaves behind an entry that would shadow
//! a newer rate for a later date.
//!
//! The resolver does no I/O: callers run step 1 with [`RateResolver::shortcut`],
//! take an [`Epoch`], load rows themselves and finish with
//! [`RateResolver::select`].
//!
//! Every invalidation starts a new epoch. Rows loaded under an older epoch
//! may predate the invalidated write, so they still answer the lookup but
//! are not cached.

use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::EntityCache;
use crate::money::Percentage;
use crate::types::TaxRate;

/// Cache generation observed before loading rows from storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch(u64);

/// Rate caches plus the as-of selection over loaded rows.
#[derive(Debug, Default)]
pub struct RateResolver {
    by_id: EntityCache<String, TaxRate>,
    latest: EntityCache<String, TaxRate>,
    /// Held while checking an epoch and filling, and while invalidating.
    epoch: Mutex<u64>,
}

impl RateResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver whose caches hold at most `capacity` entries each.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        RateResolver {
            by_id: EntityCache::with_capacity(capacity),
            latest: EntityCache::with_capacity(capacity),
            epoch: Mutex::new(0),
        }
    }

    /// Current cache generation. Take it before loading rows.
    pub fn epoch(&self) -> Epoch {
        Epoch(*self.epoch.lock())
    }

    /// Runs `fill` unless an invalidation happened since `epoch`.
    fn fill_if_current(&self, epoch: Epoch, fill: impl FnOnce()) {
        let current = self.epoch.lock();
        if *current == epoch.0 {
            fill();
        } else {
            debug!("Rates changed during load, not caching");
        }
    }

    fn next_epoch(&self, clear: impl FnOnce()) {
        let mut current = self.epoch.lock();
        *current += 1;
        clear();
    }

    /// Answers from the cache when the newest rate of the type already
    /// applies on `date`.
    pub fn shortcut(&self, type_id: &str, date: NaiveDate) -> Option<Percentage> {
        self.latest
            .get(&type_id.to_string())
            .filter(|rate| rate.effective_from <= date)
            .map(|rate| rate.rate())
    }

    /// Picks the rate in effect on `date` from `rows`, which must hold every
    /// rate of `type_id` ordered newest first, as loaded under `epoch`.
    pub fn select(
        &self,
        type_id: &str,
        date: NaiveDate,
        rows: &[TaxRate],
        epoch: Epoch,
    ) -> Percentage {
        debug_assert!(
            rows.windows(2).all(|w| w[0].effective_from >= w[1].effective_from),
            "rates must be ordered by effective_from descending"
        );

        let selected = rows.iter().position(|row| row.effective_from <= date);

        self.fill_if_current(epoch, || {
            if let Some(newest) = rows.first() {
                self.latest.insert(type_id.to_string(), newest.clone());
            }
            let scanned = selected.map_or(rows.len(), |i| i + 1);
            for row in &rows[..scanned] {
                self.by_id.insert(row.id.clone(), row.clone());
            }
        });

        match selected {
            Some(i) => {
                let rate = rows[i].rate();
                debug!(type_id, %date, rate = %rate, "Resolved tax rate");
                rate
            }
            None => {
                debug!(type_id, %date, "No tax rate in effect");
                Percentage::zero()
            }
        }
    }

    /// Full lookup against a synchronous row source.
    pub fn resolve_with<E>(
        &self,
        type_id: &str,
        date: NaiveDate,
        load: impl FnOnce(&str) -> Result<Vec<TaxRate>, E>,
    ) -> Result<Percentage, E> {
        if let Some(rate) = self.shortcut(type_id, date) {
            return Ok(rate);
        }
        let epoch = self.epoch();
        let rows = load(type_id)?;
        Ok(self.select(type_id, date, &rows, epoch))
    }

    /// Newest cached rate of a type, if it was loaded before.
    pub fn cached_latest(&self, type_id: &str) -> Option<TaxRate> {
        self.latest.get(&type_id.to_string())
    }

    /// Caches the newest rate of a type after a direct lookup.
    pub fn remember_latest(&self, rate: TaxRate, epoch: Epoch) {
        self.fill_if_current(epoch, || {
            self.by_id.insert(rate.id.clone(), rate.clone());
            self.latest.insert(rate.type_id().to_string(), rate);
        });
    }

    pub fn remember(&self, rate: TaxRate, epoch: Epoch) {
        self.fill_if_current(epoch, || self.by_id.insert(rate.id.clone(), rate));
    }

    pub fn rate_by_id(&self, id: &str) -> Option<TaxRate> {
        self.by_id.get(&id.to_string())
    }

    /// Drops everything cached about `rate` and its type's newest rate.
    pub fn invalidate(&self, rate: &TaxRate) {
        self.next_epoch(|| {
            self.by_id.invalidate(&rate.id);
            self.latest.invalidate(&rate.type_id().to_string());
        });
    }

    pub fn clear(&self) {
        self.next_epoch(|| {
            self.by_id.clear();
            self.latest.clear();
        });
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
