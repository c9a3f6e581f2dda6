//! # Tax Engine
//!
//! Resolves rates, computes tax lines for a document line and writes the
//! result. Owns every cache; repositories stay cache-free.
//!
//! ## compute_tax Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  compute_tax(request)                                                   │
//! │                                                                         │
//! │  region = request.region_id or default_region()                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  types = definitions.list_types(category, region, date)                │
//! │  existing = tax_lines.list_for_parent(parent_id)                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  for each type (display order)                                         │
//! │     rate   = rate_as_of(date, type)       ← RateResolver caches        │
//! │     method = method_for(type)             ← MethodRegistry + cache      │
//! │     assess(type, method, input, rate)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  reconcile(region, parent, assessments, existing)                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  TaxReconciliation { to_insert, to_update, to_delete, unchanged }      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cache Invalidation
//! | Saved through the engine | Dropped                                        |
//! |--------------------------|------------------------------------------------|
//! | `TaxRate`                | rate by id, newest rate of its type            |
//! | `TaxType`                | type by id, type list of its region            |
//! | `TaxRegion`              | its type list; default region (`refresh`)      |
//! | `TaxMethodRecord`        | compiled strategy                              |
//!
//! Writes that bypass the engine are not seen until [`TaxEngine::clear_caches`].

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use levy_core::method::PercentageTax;
use levy_core::reconcile::{assess, reconcile};
use levy_core::{
    CoreError, Currency, CurrencyConverter, EntityCache, ItemType, MethodRegistry, Money,
    Percentage, RateResolver, TaxDefinition, TaxInput, TaxMethod, TaxMethodRecord, TaxRate,
    TaxReconciliation, TaxRegion, TaxType,
};

use crate::config::{DefaultRegionPolicy, LevyConfig};
use crate::error::{DbError, DbResult};
use crate::pool::Database;

// =============================================================================
// Request / Result
// =============================================================================

/// One document line to compute taxes for.
#[derive(Debug, Clone)]
pub struct TaxRequest<'a> {
    /// Date the rates and applicable periods are evaluated on.
    pub date: NaiveDate,
    /// Document the tax lines belong to.
    pub parent_id: &'a str,
    /// Region to tax in; the default region when `None`.
    pub region_id: Option<&'a str>,
    pub item_type: &'a ItemType,
    pub quantity: i64,
    pub unit_cost: Money,
    /// Currency of the computed tax amounts.
    pub local_currency: Currency,
}

/// Outcome of [`TaxEngine::compute_and_apply`].
#[derive(Debug, Clone)]
pub struct AppliedTaxes {
    pub plan: TaxReconciliation,
    /// Change of the document's tax total caused by the plan.
    pub net_change: Money,
}

// =============================================================================
// Engine
// =============================================================================

/// Tax computation service over a [`Database`].
///
/// ## Usage
/// ```rust,ignore
/// let config = LevyConfig::load(None)?;
/// let engine = TaxEngine::open(&config).await?;
///
/// let applied = engine.compute_and_apply(&TaxRequest {
///     date: grn.date,
///     parent_id: &grn_line.id,
///     region_id: None,
///     item_type: &grn_line.item_type,
///     quantity: grn_line.quantity,
///     unit_cost: grn_line.unit_cost,
///     local_currency: aed,
/// }).await?;
/// grn.tax_total += applied.net_change;
/// ```
pub struct TaxEngine {
    db: Database,
    registry: MethodRegistry,
    converter: Arc<dyn CurrencyConverter>,
    policy: DefaultRegionPolicy,
    rates: RateResolver,
    types: EntityCache<String, TaxType>,
    region_types: EntityCache<String, Arc<Vec<TaxType>>>,
    methods: EntityCache<String, Arc<dyn TaxMethod>>,
    default_region: RwLock<Option<TaxRegion>>,
}

impl TaxEngine {
    /// Creates an engine over an open database.
    pub fn new(db: Database, config: &LevyConfig) -> DbResult<Self> {
        let capacity = config.cache.capacity();
        let converter = config.currency.exchange_rates()?;

        Ok(TaxEngine {
            db,
            registry: MethodRegistry::with_builtins(),
            converter: Arc::new(converter),
            policy: config.region.default_policy,
            rates: RateResolver::with_capacity(capacity),
            types: EntityCache::with_capacity(capacity),
            region_types: EntityCache::with_capacity(capacity),
            methods: EntityCache::with_capacity(capacity),
            default_region: RwLock::new(None),
        })
    }

    /// Connects to the configured database and creates an engine.
    pub async fn open(config: &LevyConfig) -> DbResult<Self> {
        let db = Database::new(config.db_config()).await?;
        Self::new(db, config)
    }

    /// Replaces the strategy registry. Compiled strategies are dropped.
    pub fn with_registry(mut self, registry: MethodRegistry) -> Self {
        self.registry = registry;
        self.methods.clear();
        self
    }

    /// Replaces the currency converter built from `[currency]`.
    pub fn with_converter(mut self, converter: Arc<dyn CurrencyConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Rates
    // =========================================================================

    /// Rate of `type_id` in effect on `date`.
    ///
    /// Never fails: no rate on or before `date` gives 0%, and so does a
    /// storage error (logged at `warn`).
    pub async fn rate_as_of(&self, date: NaiveDate, type_id: &str) -> Percentage {
        if let Some(rate) = self.rates.shortcut(type_id, date) {
            return rate;
        }

        let epoch = self.rates.epoch();
        match self.db.tax_rates().list_for_type(type_id).await {
            Ok(rows) => self.rates.select(type_id, date, &rows, epoch),
            Err(e) => {
                warn!(type_id = %type_id, %date, error = %e, "Rate lookup failed, using zero rate");
                Percentage::zero()
            }
        }
    }

    /// Newest rate of `type_id`, whatever its effective date. 0% when the
    /// type has no rate or storage fails.
    pub async fn latest_rate(&self, type_id: &str) -> Percentage {
        if let Some(rate) = self.rates.cached_latest(type_id) {
            return rate.rate();
        }

        let epoch = self.rates.epoch();
        match self.db.tax_rates().latest_for_type(type_id).await {
            Ok(Some(rate)) => {
                let pct = rate.rate();
                self.rates.remember_latest(rate, epoch);
                pct
            }
            Ok(None) => Percentage::zero(),
            Err(e) => {
                warn!(type_id = %type_id, error = %e, "Latest rate lookup failed, using zero rate");
                Percentage::zero()
            }
        }
    }

    pub async fn rate_by_id(&self, id: &str) -> DbResult<Option<TaxRate>> {
        if let Some(rate) = self.rates.rate_by_id(id) {
            return Ok(Some(rate));
        }
        let epoch = self.rates.epoch();
        let rate = self.db.tax_rates().get_by_id(id).await?;
        if let Some(rate) = &rate {
            self.rates.remember(rate.clone(), epoch);
        }
        Ok(rate)
    }

    // =========================================================================
    // Types, Regions, Methods
    // =========================================================================

    pub async fn tax_type(&self, id: &str) -> DbResult<Option<TaxType>> {
        if let Some(tax_type) = self.types.get(&id.to_string()) {
            return Ok(Some(tax_type));
        }
        let tax_type = self.db.tax_types().get_by_id(id).await?;
        if let Some(tax_type) = &tax_type {
            self.types.insert(tax_type.id.clone(), tax_type.clone());
        }
        Ok(tax_type)
    }

    /// Tax types of a region in display order, optionally only those
    /// applicable on `on`.
    pub async fn region_tax_types(
        &self,
        region_id: &str,
        on: Option<NaiveDate>,
    ) -> DbResult<Vec<TaxType>> {
        let key = region_id.to_string();
        let all = match self.region_types.get(&key) {
            Some(all) => all,
            None => {
                let loaded = Arc::new(self.db.tax_types().list_for_region(region_id).await?);
                self.region_types.insert(key, Arc::clone(&loaded));
                loaded
            }
        };

        Ok(all
            .iter()
            .filter(|t| on.map_or(true, |date| t.is_applicable_on(date)))
            .cloned()
            .collect())
    }

    /// First active region in insertion order, cached per engine.
    pub async fn default_region(&self) -> DbResult<Option<TaxRegion>> {
        let cached = self.default_region.read().clone();
        if cached.is_some() {
            return Ok(cached);
        }

        let region = self.db.regions().first_active().await?;
        if let Some(region) = &region {
            debug!(region_id = %region.id, name = %region.name, "Caching default region");
            *self.default_region.write() = Some(region.clone());
        }
        Ok(region)
    }

    /// Forgets the cached default region.
    pub fn invalidate_default_region(&self) {
        *self.default_region.write() = None;
    }

    /// Strategy computing `tax_type`'s amounts. Types without a method use
    /// the percentage strategy.
    pub async fn method_for(&self, tax_type: &TaxType) -> DbResult<Arc<dyn TaxMethod>> {
        let Some(method_id) = tax_type.tax_method_id() else {
            return Ok(Arc::new(PercentageTax));
        };

        if let Some(method) = self.methods.get(&method_id.to_string()) {
            return Ok(method);
        }

        let record = self
            .db
            .tax_methods()
            .get_by_id(method_id)
            .await?
            .ok_or_else(|| DbError::not_found("TaxMethod", method_id))?;
        let method = self.registry.build(&record)?;
        self.methods.insert(record.id, Arc::clone(&method));
        Ok(method)
    }

    // =========================================================================
    // Computation
    // =========================================================================

    /// Computes the tax lines `request`'s document line should carry and
    /// reconciles them with the stored ones. Nothing is written.
    pub async fn compute_tax(&self, request: &TaxRequest<'_>) -> DbResult<TaxReconciliation> {
        let region_id = match request.region_id {
            Some(id) => id.to_string(),
            None => self
                .default_region()
                .await?
                .map(|r| r.id)
                .ok_or_else(|| CoreError::invalid_value("Region"))?,
        };

        let types = self
            .db
            .tax_definitions()
            .list_types(&request.item_type.tax_category, &region_id, request.date)
            .await?;
        let existing = self.db.tax_lines().list_for_parent(request.parent_id).await?;

        let input = TaxInput {
            item_type: request.item_type,
            quantity: request.quantity,
            unit_cost: request.unit_cost,
            local_currency: request.local_currency,
            converter: self.converter.as_ref(),
        };

        let mut assessments = Vec::with_capacity(types.len());
        for tax_type in &types {
            self.types.insert(tax_type.id.clone(), tax_type.clone());
            let rate = self.rate_as_of(request.date, &tax_type.id).await;
            let method = self.method_for(tax_type).await?;
            assessments.push(assess(tax_type, method.as_ref(), &input, rate)?);
        }

        Ok(reconcile(&region_id, request.parent_id, &assessments, existing))
    }

    /// Writes a plan and returns the change of the document's tax total in
    /// `currency`. Nothing is written when the change cannot be expressed
    /// in `currency`.
    pub async fn apply(&self, plan: &mut TaxReconciliation, currency: Currency) -> DbResult<Money> {
        let net_change = plan.net_change(currency, self.converter.as_ref())?;
        self.db.tax_lines().apply(plan).await?;
        info!(
            inserted = plan.to_insert.len(),
            updated = plan.to_update.len(),
            deleted = plan.to_delete.len(),
            net_change = %net_change,
            "Tax lines updated"
        );
        Ok(net_change)
    }

    /// [`compute_tax`](Self::compute_tax) followed by [`apply`](Self::apply).
    pub async fn compute_and_apply(&self, request: &TaxRequest<'_>) -> DbResult<AppliedTaxes> {
        let mut plan = self.compute_tax(request).await?;
        let net_change = self.apply(&mut plan, request.local_currency).await?;
        Ok(AppliedTaxes { plan, net_change })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub async fn save_region(&self, region: &TaxRegion) -> DbResult<()> {
        self.db.regions().save(region).await?;
        self.region_types.invalidate(&region.id);
        if self.policy == DefaultRegionPolicy::Refresh {
            self.invalidate_default_region();
        }
        Ok(())
    }

    pub async fn save_tax_type(&self, tax_type: &mut TaxType) -> DbResult<()> {
        self.db.tax_types().save(tax_type).await?;
        self.types.invalidate(&tax_type.id);
        self.region_types.invalidate(&tax_type.region_id().to_string());
        Ok(())
    }

    pub async fn save_tax_rate(&self, rate: &mut TaxRate) -> DbResult<()> {
        self.db.tax_rates().save(rate).await?;
        self.rates.invalidate(rate);
        Ok(())
    }

    pub async fn delete_tax_rate(&self, rate: &TaxRate) -> DbResult<()> {
        self.db.tax_rates().delete(&rate.id).await?;
        self.rates.invalidate(rate);
        Ok(())
    }

    pub async fn save_tax_method(&self, record: &TaxMethodRecord) -> DbResult<()> {
        self.db.tax_methods().save(record).await?;
        self.methods.invalidate(&record.id);
        Ok(())
    }

    pub async fn save_definition(&self, definition: &TaxDefinition) -> DbResult<()> {
        self.db.tax_definitions().save(definition).await
    }

    /// Drops every cached entity.
    pub fn clear_caches(&self) {
        self.rates.clear();
        self.types.clear();
        self.region_types.clear();
        self.methods.clear();
        self.invalidate_default_region();
    }
}

impl fmt::Debug for TaxEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaxEngine")
            .field("db", &self.db)
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .field("rates", &self.rates)
            .field("types", &self.types)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{date, uae, Uae};
    use levy_core::{ExchangeRates, Tax, TaxLineStatus};

    const GRN_LINE: &str = "grn-2023-0042/1";

    fn aed() -> Currency {
        "AED".parse().unwrap()
    }

    fn soft_drink() -> ItemType {
        ItemType {
            id: "cola-330".to_string(),
            name: "Cola 330ml".to_string(),
            tax_category: "1".to_string(),
        }
    }

    async fn engine_with(config: LevyConfig) -> (TaxEngine, Uae) {
        let engine = TaxEngine::open(&config).await.unwrap();
        let fx = uae(engine.database()).await;
        (engine, fx)
    }

    async fn engine() -> (TaxEngine, Uae) {
        engine_with(LevyConfig::in_memory()).await
    }

    /// 10 × AED 10.00 on `on`.
    fn request<'a>(item: &'a ItemType, region_id: &'a str, on: NaiveDate) -> TaxRequest<'a> {
        TaxRequest {
            date: on,
            parent_id: GRN_LINE,
            region_id: Some(region_id),
            item_type: item,
            quantity: 10,
            unit_cost: Money::from_minor(1000, aed()),
            local_currency: aed(),
        }
    }

    fn summary(lines: &[&Tax]) -> Vec<(String, u32, i64, TaxLineStatus)> {
        lines
            .iter()
            .map(|l| (l.type_id().to_string(), l.rate().bps(), l.tax().minor(), l.status()))
            .collect()
    }

    // ----- Rate resolution -----

    #[tokio::test]
    async fn test_rate_as_of() {
        let (engine, fx) = engine().await;
        let vat = fx.vat.id.as_str();

        assert_eq!(engine.rate_as_of(date(2022, 6, 1), vat).await, Percentage::from_percent(5));
        assert_eq!(engine.rate_as_of(date(2023, 6, 1), vat).await, Percentage::from_percent(7));
        assert_eq!(engine.rate_as_of(date(2019, 1, 1), vat).await, Percentage::zero());
        assert_eq!(engine.rate_as_of(date(2023, 1, 1), vat).await, Percentage::from_percent(7));
        assert_eq!(engine.rate_as_of(date(2021, 1, 1), "no-such-type").await, Percentage::zero());
    }

    #[tokio::test]
    async fn test_cached_lookups_match_fresh_engine() {
        let (engine, fx) = engine().await;
        let vat = fx.vat.id.as_str();
        let dates = [
            date(2022, 1, 1),
            date(2023, 6, 1),
            date(2019, 12, 31),
            date(2020, 1, 1),
            date(2024, 2, 29),
            date(2022, 12, 31),
        ];

        let config = LevyConfig::in_memory();
        for on in dates {
            let fresh = TaxEngine::new(engine.database().clone(), &config).unwrap();
            assert_eq!(
                engine.rate_as_of(on, vat).await,
                fresh.rate_as_of(on, vat).await,
                "on {on}"
            );
        }
    }

    #[tokio::test]
    async fn test_new_rate_visible_after_save() {
        let (engine, fx) = engine().await;
        let vat = fx.vat.id.as_str();
        assert_eq!(engine.rate_as_of(date(2025, 6, 1), vat).await, Percentage::from_percent(7));
        assert_eq!(engine.latest_rate(vat).await, Percentage::from_percent(7));

        let mut raise = TaxRate::new(vat, Percentage::from_percent(10), date(2025, 1, 1));
        engine.save_tax_rate(&mut raise).await.unwrap();

        assert_eq!(engine.rate_as_of(date(2025, 6, 1), vat).await, Percentage::from_percent(10));
        assert_eq!(engine.rate_as_of(date(2024, 6, 1), vat).await, Percentage::from_percent(7));
        assert_eq!(engine.latest_rate(vat).await, Percentage::from_percent(10));

        engine.delete_tax_rate(&raise).await.unwrap();
        assert_eq!(engine.rate_as_of(date(2025, 6, 1), vat).await, Percentage::from_percent(7));
    }

    #[tokio::test]
    async fn test_rate_saved_during_scan_is_not_shadowed() {
        let (engine, fx) = engine().await;
        let vat = fx.vat.id.as_str();

        // A scan loads the old rows, then a new rate is saved before it finishes
        let epoch = engine.rates.epoch();
        let old_rows = engine.database().tax_rates().list_for_type(vat).await.unwrap();
        let mut raise = TaxRate::new(vat, Percentage::from_percent(10), date(2025, 1, 1));
        engine.save_tax_rate(&mut raise).await.unwrap();
        assert_eq!(
            engine.rates.select(vat, date(2025, 6, 1), &old_rows, epoch),
            Percentage::from_percent(7)
        );

        assert_eq!(engine.rate_as_of(date(2025, 6, 1), vat).await, Percentage::from_percent(10));
        assert_eq!(engine.rate_as_of(date(2026, 1, 1), vat).await, Percentage::from_percent(10));
    }

    #[tokio::test]
    async fn test_rate_by_id_uses_scan_results() {
        let (engine, fx) = engine().await;
        let rows = engine.database().tax_rates().list_for_type(&fx.vat.id).await.unwrap();
        engine.rate_as_of(date(2020, 6, 1), &fx.vat.id).await;

        // Remove the rows behind the engine's back: the by-id cache still answers
        for row in &rows {
            engine.database().tax_rates().delete(&row.id).await.unwrap();
        }
        for row in &rows {
            let cached = engine.rate_by_id(&row.id).await.unwrap().unwrap();
            assert_eq!(cached.rate(), row.rate());
        }

        engine.clear_caches();
        assert!(engine.rate_by_id(&rows[0].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_storage_failure_degrades_to_zero() {
        let (engine, fx) = engine().await;
        engine.database().close().await;

        assert_eq!(engine.rate_as_of(date(2023, 6, 1), &fx.vat.id).await, Percentage::zero());
        assert_eq!(engine.latest_rate(&fx.vat.id).await, Percentage::zero());
    }

    // ----- Computation -----

    #[tokio::test]
    async fn test_new_document_gets_lines_in_display_order() {
        let (engine, fx) = engine().await;
        let item = soft_drink();

        let plan = engine
            .compute_tax(&request(&item, &fx.region.id, date(2023, 6, 1)))
            .await
            .unwrap();

        assert_eq!(
            summary(&plan.lines()),
            vec![
                (fx.vat.id.clone(), 700, 700, TaxLineStatus::New),
                (fx.excise.id.clone(), 200, 200, TaxLineStatus::New),
            ]
        );
        // Nothing written yet
        assert!(engine.database().tax_lines().list_for_parent(GRN_LINE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_rate_is_recomputed() {
        let (engine, fx) = engine().await;
        let item = soft_drink();

        // Booked in 2022 at 5%
        let applied = engine
            .compute_and_apply(&request(&item, &fx.region.id, date(2022, 6, 1)))
            .await
            .unwrap();
        assert_eq!(applied.net_change.minor(), 700);

        // Redated into 2023: VAT moves to 7%, excise stays
        let plan = engine
            .compute_tax(&request(&item, &fx.region.id, date(2023, 6, 1)))
            .await
            .unwrap();
        assert_eq!(
            summary(&plan.lines()),
            vec![
                (fx.vat.id.clone(), 700, 700, TaxLineStatus::Recomputed),
                (fx.excise.id.clone(), 200, 200, TaxLineStatus::Unchanged),
            ]
        );
        assert_eq!(plan.net_change(aed(), &ExchangeRates::new(aed())).unwrap().minor(), 200);
    }

    #[tokio::test]
    async fn test_second_computation_is_unchanged() {
        let (engine, fx) = engine().await;
        let item = soft_drink();
        let req = request(&item, &fx.region.id, date(2023, 6, 1));

        engine.compute_and_apply(&req).await.unwrap();
        let again = engine.compute_and_apply(&req).await.unwrap();

        assert!(again.plan.is_noop());
        assert!(again.net_change.is_zero());
        assert!(again
            .plan
            .lines()
            .iter()
            .all(|l| l.status() == TaxLineStatus::Unchanged));
        assert_eq!(engine.database().tax_lines().total_for_parent(GRN_LINE).await.unwrap(), 900);
    }

    #[tokio::test]
    async fn test_expired_type_line_is_deleted() {
        let (engine, fx) = engine().await;
        let item = soft_drink();
        engine
            .compute_and_apply(&request(&item, &fx.region.id, date(2023, 6, 1)))
            .await
            .unwrap();

        let mut excise = engine.tax_type(&fx.excise.id).await.unwrap().unwrap();
        excise.applicable_to = date(2023, 3, 31);
        engine.save_tax_type(&mut excise).await.unwrap();

        let applied = engine
            .compute_and_apply(&request(&item, &fx.region.id, date(2023, 6, 1)))
            .await
            .unwrap();
        assert_eq!(applied.plan.to_delete.len(), 1);
        assert_eq!(applied.plan.to_delete[0].type_id(), fx.excise.id);
        assert_eq!(applied.net_change.minor(), -200);

        let stored = engine.database().tax_lines().list_for_parent(GRN_LINE).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].type_id(), fx.vat.id);
    }

    #[tokio::test]
    async fn test_region_change_replaces_lines() {
        let (engine, fx) = engine().await;
        let item = soft_drink();
        engine
            .compute_and_apply(&request(&item, &fx.region.id, date(2023, 6, 1)))
            .await
            .unwrap();

        let ksa = TaxRegion::new("KSA");
        engine.save_region(&ksa).await.unwrap();
        let mut ksa_vat = TaxType::new("VAT", &ksa.id);
        engine.save_tax_type(&mut ksa_vat).await.unwrap();
        engine
            .save_tax_rate(&mut TaxRate::new(ksa_vat.id.as_str(), Percentage::from_percent(15), date(2020, 7, 1)))
            .await
            .unwrap();
        engine
            .save_definition(&TaxDefinition::new("1", &ksa.id, &ksa_vat.id))
            .await
            .unwrap();

        let plan = engine
            .compute_tax(&request(&item, &ksa.id, date(2023, 6, 1)))
            .await
            .unwrap();
        assert_eq!(plan.to_delete.len(), 2);
        assert!(plan
            .to_delete
            .iter()
            .all(|l| l.status() == TaxLineStatus::RegionChanged));
        assert_eq!(
            summary(&plan.lines()),
            vec![(ksa_vat.id.clone(), 1500, 1500, TaxLineStatus::New)]
        );
        assert_eq!(plan.lines()[0].region_id(), ksa.id);
    }

    #[tokio::test]
    async fn test_fixed_tax_type() {
        let (engine, fx) = engine().await;
        let item = soft_drink();

        let mut fixed = engine
            .database()
            .tax_methods()
            .get_by_kind("fixed_tax")
            .await
            .unwrap()
            .unwrap();
        fixed.fixed_amount_minor = 150;
        engine.save_tax_method(&fixed).await.unwrap();

        let mut stamp = TaxType::new("Stamp Duty", &fx.region.id);
        stamp.display_order = 3;
        stamp.set_tax_method(&fixed.id).unwrap();
        engine.save_tax_type(&mut stamp).await.unwrap();
        engine
            .save_tax_rate(&mut TaxRate::new(stamp.id.as_str(), Percentage::from_percent(50), date(2020, 1, 1)))
            .await
            .unwrap();
        engine
            .save_definition(&TaxDefinition::new("1", &fx.region.id, &stamp.id))
            .await
            .unwrap();

        for quantity in [1, 10, 500] {
            let mut req = request(&item, &fx.region.id, date(2023, 6, 1));
            req.quantity = quantity;
            let plan = engine.compute_tax(&req).await.unwrap();
            let stamp_line = plan
                .lines()
                .into_iter()
                .find(|l| l.type_id() == stamp.id)
                .cloned()
                .unwrap();
            assert_eq!(stamp_line.tax(), Money::from_minor(150, aed()));
        }
    }

    #[tokio::test]
    async fn test_unknown_method_kind_is_an_error() {
        let (engine, fx) = engine().await;
        let item = soft_drink();

        let slab = TaxMethodRecord::new("Slab", "slab");
        engine.save_tax_method(&slab).await.unwrap();
        let mut odd = TaxType::new("Odd", &fx.region.id);
        odd.set_tax_method(&slab.id).unwrap();
        engine.save_tax_type(&mut odd).await.unwrap();
        engine
            .save_definition(&TaxDefinition::new("1", &fx.region.id, &odd.id))
            .await
            .unwrap();

        let err = engine
            .compute_tax(&request(&item, &fx.region.id, date(2023, 6, 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::UnknownTaxMethod(ref k)) if k == "slab"));
    }

    #[tokio::test]
    async fn test_foreign_cost_converted_to_local_currency() {
        let mut config = LevyConfig::in_memory();
        config.currency.base = "AED".to_string();
        config.currency.rates.insert("USD".to_string(), 3_672_500);
        let (engine, fx) = engine_with(config).await;
        let item = soft_drink();

        let mut req = request(&item, &fx.region.id, date(2023, 6, 1));
        req.unit_cost = Money::from_minor(1000, "USD".parse().unwrap());
        let plan = engine.compute_tax(&req).await.unwrap();

        // USD 100 × 7% = USD 7.00 = AED 25.7075 → 25.71
        let vat = plan.lines()[0].tax();
        assert_eq!(vat, Money::from_minor(2571, aed()));
    }

    #[tokio::test]
    async fn test_local_currency_change_converts_previous_lines() {
        let mut config = LevyConfig::in_memory();
        config.currency.base = "AED".to_string();
        config.currency.rates.insert("USD".to_string(), 3_672_500);
        let (engine, fx) = engine_with(config).await;
        let item = soft_drink();
        let usd: Currency = "USD".parse().unwrap();

        // AED 7.00 VAT = USD 1.91, AED 2.00 excise = USD 0.54
        let mut req = request(&item, &fx.region.id, date(2023, 6, 1));
        req.local_currency = usd;
        let first = engine.compute_and_apply(&req).await.unwrap();
        assert_eq!(first.net_change, Money::from_minor(245, usd));

        // Same document in AED: old lines are worth AED 7.01 and AED 1.98
        let second = engine
            .compute_and_apply(&request(&item, &fx.region.id, date(2023, 6, 1)))
            .await
            .unwrap();
        assert_eq!(
            summary(&second.plan.lines()),
            vec![
                (fx.vat.id.clone(), 700, 700, TaxLineStatus::Recomputed),
                (fx.excise.id.clone(), 200, 200, TaxLineStatus::Recomputed),
            ]
        );
        assert_eq!(second.net_change, Money::from_minor(1, aed()));

        let stored = engine.database().tax_lines().list_for_parent(GRN_LINE).await.unwrap();
        assert!(stored.iter().all(|l| l.tax().currency() == aed()));
    }

    #[tokio::test]
    async fn test_missing_exchange_rate_fails() {
        let (engine, fx) = engine().await;
        let item = soft_drink();
        let mut req = request(&item, &fx.region.id, date(2023, 6, 1));
        req.unit_cost = Money::from_minor(1000, "EUR".parse().unwrap());

        let err = engine.compute_tax(&req).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::MissingExchangeRate { .. })));
    }

    // ----- Regions -----

    #[tokio::test]
    async fn test_default_region_used_when_none_given() {
        let (engine, fx) = engine().await;
        let item = soft_drink();
        let mut req = request(&item, &fx.region.id, date(2023, 6, 1));
        req.region_id = None;

        let plan = engine.compute_tax(&req).await.unwrap();
        assert_eq!(plan.lines().len(), 2);
        assert!(plan.lines().iter().all(|l| l.region_id() == fx.region.id));
    }

    #[tokio::test]
    async fn test_no_region_at_all() {
        let engine = TaxEngine::open(&LevyConfig::in_memory()).await.unwrap();
        let item = soft_drink();
        let req = TaxRequest {
            date: date(2023, 6, 1),
            parent_id: GRN_LINE,
            region_id: None,
            item_type: &item,
            quantity: 1,
            unit_cost: Money::from_minor(100, aed()),
            local_currency: aed(),
        };
        let err = engine.compute_tax(&req).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_default_region_refresh_policy() {
        let (engine, mut fx) = engine().await;
        assert_eq!(engine.default_region().await.unwrap().unwrap().id, fx.region.id);

        fx.region.active = false;
        engine.save_region(&fx.region).await.unwrap();
        let ksa = TaxRegion::new("KSA");
        engine.save_region(&ksa).await.unwrap();

        assert_eq!(engine.default_region().await.unwrap().unwrap().id, ksa.id);
    }

    #[tokio::test]
    async fn test_default_region_pinned_policy() {
        let mut config = LevyConfig::in_memory();
        config.region.default_policy = DefaultRegionPolicy::Pinned;
        let (engine, mut fx) = engine_with(config).await;
        assert_eq!(engine.default_region().await.unwrap().unwrap().id, fx.region.id);

        fx.region.active = false;
        engine.save_region(&fx.region).await.unwrap();
        let ksa = TaxRegion::new("KSA");
        engine.save_region(&ksa).await.unwrap();
        assert_eq!(engine.default_region().await.unwrap().unwrap().id, fx.region.id);

        engine.invalidate_default_region();
        assert_eq!(engine.default_region().await.unwrap().unwrap().id, ksa.id);
    }

    #[tokio::test]
    async fn test_region_tax_types_cached_and_filtered() {
        let (engine, fx) = engine().await;

        let all = engine.region_tax_types(&fx.region.id, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, fx.vat.id);

        let mut tourism = TaxType::new("Tourism", &fx.region.id);
        tourism.display_order = 3;
        tourism.applicable_from = date(2024, 1, 1);
        engine.save_tax_type(&mut tourism).await.unwrap();

        let all = engine.region_tax_types(&fx.region.id, None).await.unwrap();
        assert_eq!(all.len(), 3);
        let in_2023 = engine
            .region_tax_types(&fx.region.id, Some(date(2023, 6, 1)))
            .await
            .unwrap();
        assert_eq!(in_2023.len(), 2);
    }
}
