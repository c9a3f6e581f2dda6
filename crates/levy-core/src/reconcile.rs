//! # Tax-Line Reconciliation
//!
//! Compares the tax lines a document should carry with the ones it already
//! has and decides what to insert, update and delete.
//!
//! ## Decision Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  existing line                              status          plan        │
//! │  ─────────────────────────────────────────  ──────────────  ──────────  │
//! │  region differs from the document's         RegionChanged   to_delete   │
//! │  type not applicable (or already seen)      NotApplicable   to_delete   │
//! │  rate or amount differs                     Recomputed      to_update   │
//! │  rate and amount match                      Unchanged       unchanged   │
//! │                                                                         │
//! │  applicable type without a line             New             to_insert   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every line in `to_insert`, `to_update` and `to_delete` carries the
//! internal flag, so it passes `Tax::validate` until the repository saves it.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::CoreResult;
use crate::method::{TaxInput, TaxMethod};
use crate::money::{Currency, CurrencyConverter, Money, Percentage};
use crate::types::{Tax, TaxLineStatus, TaxType};

/// What one applicable tax type should contribute to a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub tax_type: TaxType,
    pub rate: Percentage,
    pub amount: Money,
}

/// Runs `method` for one applicable type.
pub fn assess(
    tax_type: &TaxType,
    method: &dyn TaxMethod,
    input: &TaxInput<'_>,
    rate: Percentage,
) -> CoreResult<Assessment> {
    let amount = method.tax(input, rate)?;
    Ok(Assessment {
        tax_type: tax_type.clone(),
        rate,
        amount,
    })
}

/// The outcome of reconciling a document's tax lines.
#[derive(Debug, Clone, Default)]
pub struct TaxReconciliation {
    pub to_insert: Vec<Tax>,
    pub to_update: Vec<Tax>,
    pub to_delete: Vec<Tax>,
    pub unchanged: Vec<Tax>,
    /// Applicable type ids in display order.
    order: Vec<String>,
    /// Amounts of updated lines before recomputation, by line id.
    previous: HashMap<String, Money>,
}

impl TaxReconciliation {
    /// Lines the document carries afterwards, in display order of their types.
    pub fn lines(&self) -> Vec<&Tax> {
        let mut lines: Vec<&Tax> = self
            .to_insert
            .iter()
            .chain(&self.to_update)
            .chain(&self.unchanged)
            .collect();
        lines.sort_by_key(|line| {
            self.order
                .iter()
                .position(|id| id == line.type_id())
                .unwrap_or(usize::MAX)
        });
        lines
    }

    /// Nothing to write.
    pub fn is_noop(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// Stored amount of an updated line before recomputation.
    pub fn previous_amount(&self, line_id: &str) -> Option<Money> {
        self.previous.get(line_id).copied()
    }

    /// Change of the document's total tax once the plan is applied, in
    /// `currency`.
    ///
    /// Lines stored in another currency (the document was last computed
    /// with a different local currency) are converted first.
    pub fn net_change(
        &self,
        currency: Currency,
        converter: &dyn CurrencyConverter,
    ) -> CoreResult<Money> {
        let local = |amount: Money| in_currency(amount, currency, converter);

        let mut net = Money::zero(currency);
        for line in &self.to_insert {
            net = net.checked_add(local(line.tax())?)?;
        }
        for line in &self.to_update {
            net = net.checked_add(local(line.tax())?)?;
            if let Some(previous) = self.previous.get(line.id()) {
                net = net.checked_sub(local(*previous)?)?;
            }
        }
        for line in &self.to_delete {
            net = net.checked_sub(local(line.tax())?)?;
        }
        Ok(net)
    }

    /// Total tax of the document once the plan is applied, in `currency`.
    pub fn total(&self, currency: Currency, converter: &dyn CurrencyConverter) -> CoreResult<Money> {
        self.lines()
            .into_iter()
            .try_fold(Money::zero(currency), |acc, line| {
                acc.checked_add(in_currency(line.tax(), currency, converter)?)
            })
    }
}

fn in_currency(amount: Money, to: Currency, converter: &dyn CurrencyConverter) -> CoreResult<Money> {
    if amount.is_zero() {
        return Ok(Money::zero(to));
    }
    converter.convert(amount, to)
}

/// Reconciles `existing` lines of `parent_id` against the assessments of
/// the types applicable in `region_id`, given in display order.
pub fn reconcile(
    region_id: &str,
    parent_id: &str,
    assessments: &[Assessment],
    existing: Vec<Tax>,
) -> TaxReconciliation {
    let by_type: HashMap<&str, &Assessment> = assessments
        .iter()
        .map(|a| (a.tax_type.id.as_str(), a))
        .collect();

    let mut plan = TaxReconciliation {
        order: assessments.iter().map(|a| a.tax_type.id.clone()).collect(),
        ..Default::default()
    };
    let mut covered: HashSet<String> = HashSet::new();

    for mut line in existing {
        if line.region_id() != region_id {
            line.mark_stale(TaxLineStatus::RegionChanged);
            plan.to_delete.push(line);
            continue;
        }

        let assessment = match by_type.get(line.type_id()) {
            Some(a) if !covered.contains(line.type_id()) => *a,
            _ => {
                line.mark_stale(TaxLineStatus::NotApplicable);
                plan.to_delete.push(line);
                continue;
            }
        };
        covered.insert(line.type_id().to_string());

        if line.rate() != assessment.rate || line.tax() != assessment.amount {
            plan.previous.insert(line.id().to_string(), line.tax());
            line.recompute(assessment.rate, assessment.amount);
            plan.to_update.push(line);
        } else {
            plan.unchanged.push(line);
        }
    }

    for assessment in assessments {
        if !covered.contains(&assessment.tax_type.id) {
            plan.to_insert.push(Tax::computed(
                parent_id,
                &assessment.tax_type,
                assessment.rate,
                assessment.amount,
            ));
        }
    }

    debug!(
        parent_id,
        region_id,
        insert = plan.to_insert.len(),
        update = plan.to_update.len(),
        delete = plan.to_delete.len(),
        unchanged = plan.unchanged.len(),
        "Reconciled tax lines"
    );

    plan
}

// =============================================================================
// Unit Tests
// =============================================================================
