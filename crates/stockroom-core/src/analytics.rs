//! Analytics aggregator: derived metrics over a projected ledger.
//!
//! Every aggregate here is computed from a selection of projected movements.
//! Filtering (by category, product or movement type) only narrows that
//! selection; the formulas never change. An empty selection produces zeroed
//! aggregates rather than an error.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDateTime, Timelike};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::{
  movement::{Movement, MovementType},
  product::ProductId,
  projector::{ProjectedMovement, Projection},
};

/// Coverage below this many days marks a product as critical.
pub const CRITICAL_COVERAGE_DAYS: f64 = 3.0;

/// Cumulative sales share (percent) closing Class A in the ABC ranking.
pub const CLASS_A_CUTOFF: f64 = 80.0;

/// Cumulative sales share (percent) closing Class B.
pub const CLASS_B_CUTOFF: f64 = 95.0;

// ─── Filter ──────────────────────────────────────────────────────────────────

/// Allow-lists applied to movements. An empty list allows everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
  #[serde(default)]
  pub categories:     BTreeSet<String>,
  #[serde(default)]
  pub product_ids:    BTreeSet<ProductId>,
  #[serde(default)]
  pub movement_types: BTreeSet<MovementType>,
}

impl MovementFilter {
  pub fn matches(&self, m: &Movement) -> bool {
    (self.categories.is_empty() || self.categories.contains(&m.category))
      && (self.product_ids.is_empty() || self.product_ids.contains(&m.product_id))
      && (self.movement_types.is_empty()
        || self.movement_types.contains(&m.movement_type))
  }

  pub fn is_empty(&self) -> bool {
    self.categories.is_empty()
      && self.product_ids.is_empty()
      && self.movement_types.is_empty()
  }
}

// ─── Report types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockState {
  Low,
  Adequate,
}

impl StockState {
  pub fn classify(current_stock: i64, minimum_stock: i64) -> Self {
    if current_stock < minimum_stock { Self::Low } else { Self::Adequate }
  }
}

/// Per-product figures derived from the selected movements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
  pub product_id:      ProductId,
  pub product_name:    String,
  pub category:        String,
  pub movements:       usize,
  pub entry_quantity:  i64,
  pub exit_quantity:   i64,
  #[serde(with = "rust_decimal::serde::float")]
  pub sales_total:     Decimal,
  /// Stock after the product's last selected movement.
  pub current_stock:   i64,
  pub minimum_stock:   i64,
  #[serde(with = "rust_decimal::serde::float")]
  pub price_per_unit:  Decimal,
  #[serde(with = "rust_decimal::serde::float")]
  pub inventory_value: Decimal,
  pub stock_state:     StockState,
  /// `None` means no exit history, i.e. unbounded coverage.
  pub coverage_days:   Option<f64>,
  pub critical:        bool,
}

/// Headline figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
  #[serde(with = "rust_decimal::serde::float")]
  pub sales_total:            Decimal,
  pub distinct_products:      usize,
  pub products_below_minimum: usize,
  /// Share of products below their minimum, in percent.
  pub stock_risk_pct:         f64,
  pub critical_products:      usize,
}

/// Movement counts by weekday (0 = Monday) and hour of day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityHeatmap {
  pub counts: [[u32; 24]; 7],
}

impl Default for ActivityHeatmap {
  fn default() -> Self { Self { counts: [[0; 24]; 7] } }
}

impl ActivityHeatmap {
  pub fn record(&mut self, at: NaiveDateTime) {
    let day = at.weekday().num_days_from_monday() as usize;
    let hour = at.hour() as usize;
    self.counts[day][hour] += 1;
  }

  pub fn count(&self, day_of_week: usize, hour: usize) -> u32 {
    self
      .counts
      .get(day_of_week)
      .and_then(|row| row.get(hour))
      .copied()
      .unwrap_or(0)
  }

  pub fn total(&self) -> u32 { self.counts.iter().flatten().sum() }

  /// The busiest `(day_of_week, hour, count)` cell; earliest wins ties.
  pub fn busiest(&self) -> Option<(usize, usize, u32)> {
    let mut best: Option<(usize, usize, u32)> = None;
    for (day, row) in self.counts.iter().enumerate() {
      for (hour, &count) in row.iter().enumerate() {
        if count > 0 && best.is_none_or(|(_, _, c)| count > c) {
          best = Some((day, hour, count));
        }
      }
    }
    best
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbcClass {
  A,
  B,
  C,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoEntry {
  pub product_id:     ProductId,
  pub product_name:   String,
  #[serde(with = "rust_decimal::serde::float")]
  pub sales_total:    Decimal,
  pub share_pct:      f64,
  pub cumulative_pct: f64,
  pub class:          AbcClass,
}

/// Quantity moved per product and direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementTotals {
  pub product_id:    ProductId,
  pub product_name:  String,
  pub movement_type: MovementType,
  pub quantity:      i64,
}

/// Everything the dashboards render, computed in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
  pub filter:              MovementFilter,
  pub kpis:                Kpis,
  /// One entry per product, ordered by product id.
  pub products:            Vec<ProductSummary>,
  /// Products by descending sales with cumulative share.
  pub pareto:              Vec<ParetoEntry>,
  pub activity:            ActivityHeatmap,
  pub movement_totals:     Vec<MovementTotals>,
  /// Inventory value per category.
  pub capital_by_category: BTreeMap<String, f64>,
}

// ─── Aggregation ─────────────────────────────────────────────────────────────

/// Select the movements passing `filter` from `projection` and aggregate them.
pub fn summarize(projection: &Projection, filter: &MovementFilter) -> Report {
  let selected = projection.select(filter);
  aggregate(&selected, filter.clone())
}

#[derive(Default)]
struct Accumulator<'a> {
  movements:      usize,
  entry_quantity: i64,
  exit_quantity:  i64,
  exit_count:     usize,
  sales_total:    Decimal,
  last:           Option<&'a ProjectedMovement>,
}

/// Aggregate an already-selected set of projected movements.
pub fn aggregate(selected: &[&ProjectedMovement], filter: MovementFilter) -> Report {
  let mut per_product: BTreeMap<ProductId, Accumulator<'_>> = BTreeMap::new();
  let mut activity = ActivityHeatmap::default();

  for &entry in selected {
    let m = &entry.movement;
    activity.record(m.timestamp);

    let acc = per_product.entry(m.product_id).or_default();
    acc.movements += 1;
    acc.sales_total += m.sale_value();
    match m.movement_type {
      MovementType::Entry => acc.entry_quantity += m.quantity,
      MovementType::Exit => {
        acc.exit_quantity += m.quantity;
        acc.exit_count += 1;
      }
    }
    if acc.last.is_none_or(|l| m.chrono_key() > l.movement.chrono_key()) {
      acc.last = Some(entry);
    }
  }

  let products: Vec<ProductSummary> = per_product
    .iter()
    .filter_map(|(&product_id, acc)| {
      let last = acc.last?;
      Some(product_summary(product_id, acc, last))
    })
    .collect();

  let sales_total: Decimal = products.iter().map(|p| p.sales_total).sum();
  let products_below_minimum = products
    .iter()
    .filter(|p| p.stock_state == StockState::Low)
    .count();
  let kpis = Kpis {
    sales_total,
    distinct_products: products.len(),
    products_below_minimum,
    stock_risk_pct: products_below_minimum as f64 / products.len().max(1) as f64
      * 100.0,
    critical_products: products.iter().filter(|p| p.critical).count(),
  };

  let movement_totals = products
    .iter()
    .flat_map(|p| {
      [
        (MovementType::Entry, p.entry_quantity),
        (MovementType::Exit, p.exit_quantity),
      ]
      .into_iter()
      .filter(|(_, q)| *q > 0)
      .map(|(movement_type, quantity)| MovementTotals {
        product_id: p.product_id,
        product_name: p.product_name.clone(),
        movement_type,
        quantity,
      })
    })
    .collect();

  let mut capital: BTreeMap<String, Decimal> = BTreeMap::new();
  for p in &products {
    *capital.entry(p.category.clone()).or_default() += p.inventory_value;
  }
  let capital_by_category = capital
    .into_iter()
    .map(|(category, value)| (category, value.to_f64().unwrap_or(0.0)))
    .collect();

  Report {
    filter,
    pareto: pareto(&products),
    kpis,
    products,
    activity,
    movement_totals,
    capital_by_category,
  }
}

fn product_summary(
  product_id: ProductId,
  acc: &Accumulator<'_>,
  last: &ProjectedMovement,
) -> ProductSummary {
  let m = &last.movement;
  let current_stock = last.replayed_stock;
  let stock_state = StockState::classify(current_stock, m.minimum_stock);

  let coverage_days = (acc.exit_count > 0).then(|| {
    let mean_exit = acc.exit_quantity as f64 / acc.exit_count as f64;
    current_stock as f64 / mean_exit
  });
  let critical = coverage_days.is_some_and(|d| d < CRITICAL_COVERAGE_DAYS);

  ProductSummary {
    product_id,
    product_name: m.product_name.clone(),
    category: m.category.clone(),
    movements: acc.movements,
    entry_quantity: acc.entry_quantity,
    exit_quantity: acc.exit_quantity,
    sales_total: acc.sales_total,
    current_stock,
    minimum_stock: m.minimum_stock,
    price_per_unit: m.price_per_unit,
    inventory_value: Decimal::from(current_stock) * m.price_per_unit,
    stock_state,
    coverage_days,
    critical,
  }
}

/// ABC ranking. A product belongs to the class in which its cumulative share
/// *starts*, so the product crossing the cutoff still counts as Class A.
fn pareto(products: &[ProductSummary]) -> Vec<ParetoEntry> {
  let mut ranked: Vec<&ProductSummary> = products.iter().collect();
  ranked.sort_by(|a, b| {
    b.sales_total
      .cmp(&a.sales_total)
      .then(a.product_id.cmp(&b.product_id))
  });

  let total: Decimal = ranked.iter().map(|p| p.sales_total).sum();
  let percent = |part: Decimal| {
    if total > Decimal::ZERO {
      (part / total * Decimal::ONE_HUNDRED).to_f64().unwrap_or(0.0)
    } else {
      0.0
    }
  };

  let mut running = Decimal::ZERO;
  ranked
    .into_iter()
    .map(|p| {
      let start_pct = percent(running);
      running += p.sales_total;
      let class = if start_pct < CLASS_A_CUTOFF {
        AbcClass::A
      } else if start_pct < CLASS_B_CUTOFF {
        AbcClass::B
      } else {
        AbcClass::C
      };
      ParetoEntry {
        product_id: p.product_id,
        product_name: p.product_name.clone(),
        sales_total: p.sales_total,
        share_pct: percent(p.sales_total),
        cumulative_pct: percent(running),
        class,
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;
  use crate::{
    movement::Ledger,
    product::{Catalog, Product},
    projector::project,
  };

  /// 2025-06-02 is a Monday.
  fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, day)
      .unwrap()
      .and_hms_opt(hour, 0, 0)
      .unwrap()
  }

  fn product(
    id: i64,
    category: &str,
    price_cents: i64,
    minimum_stock: i64,
    stock: i64,
  ) -> Product {
    Product {
      product_id: ProductId(id),
      name: format!("P{id}"),
      category: category.to_owned(),
      price: Decimal::new(price_cents, 2),
      minimum_stock,
      stock,
    }
  }

  /// P1 (Bebidas, 2.00): +20, -5, -5 → 10 left, 20.00 sold.
  /// P2 (Snacks, 1.00): +5, -4 → 1 left, 4.00 sold.
  /// P3 (Snacks, 3.00): +6 only.
  fn fixture() -> Projection {
    let mut catalog = Catalog::from_products([
      product(1, "Bebidas", 200, 5, 0),
      product(2, "Snacks", 100, 3, 0),
      product(3, "Snacks", 300, 10, 0),
    ])
    .unwrap();
    let mut ledger = Ledger::new();
    let ops = [
      (1, 20, MovementType::Entry, at(2, 9)),
      (2, 5, MovementType::Entry, at(2, 9)),
      (1, 5, MovementType::Exit, at(3, 14)),
      (3, 6, MovementType::Entry, at(3, 14)),
      (2, 4, MovementType::Exit, at(4, 18)),
      (1, 5, MovementType::Exit, at(5, 14)),
    ];
    for (id, qty, kind, ts) in ops {
      ledger
        .append(&mut catalog, ProductId(id), qty, kind, ts)
        .unwrap();
    }
    project(ledger.movements(), None)
  }

  fn summary(report: &Report, id: i64) -> &ProductSummary {
    report
      .products
      .iter()
      .find(|p| p.product_id == ProductId(id))
      .unwrap()
  }

  #[test]
  fn empty_selection_yields_zeroed_report() {
    let report = summarize(&project(&[], None), &MovementFilter::default());
    assert_eq!(report.kpis.sales_total, Decimal::ZERO);
    assert_eq!(report.kpis.distinct_products, 0);
    assert_eq!(report.kpis.stock_risk_pct, 0.0);
    assert!(report.products.is_empty());
    assert!(report.pareto.is_empty());
    assert_eq!(report.activity.total(), 0);
  }

  #[test]
  fn sales_count_exits_only() {
    let report = summarize(&fixture(), &MovementFilter::default());
    assert_eq!(summary(&report, 1).sales_total, Decimal::new(2000, 2));
    assert_eq!(summary(&report, 2).sales_total, Decimal::new(400, 2));
    assert_eq!(summary(&report, 3).sales_total, Decimal::ZERO);
    assert_eq!(report.kpis.sales_total, Decimal::new(2400, 2));
  }

  #[test]
  fn stock_state_and_coverage_use_last_movement() {
    let report = summarize(&fixture(), &MovementFilter::default());

    let p1 = summary(&report, 1);
    assert_eq!(p1.current_stock, 10);
    assert_eq!(p1.stock_state, StockState::Adequate);
    assert_eq!(p1.coverage_days, Some(2.0));
    assert!(p1.critical);
    assert_eq!(p1.inventory_value, Decimal::new(2000, 2));

    let p2 = summary(&report, 2);
    assert_eq!(p2.stock_state, StockState::Low);
    assert_eq!(p2.coverage_days, Some(0.25));

    let p3 = summary(&report, 3);
    assert_eq!(p3.coverage_days, None);
    assert!(!p3.critical);
    assert_eq!(p3.stock_state, StockState::Low);

    assert_eq!(report.kpis.products_below_minimum, 2);
    assert_eq!(report.kpis.critical_products, 2);
    assert!((report.kpis.stock_risk_pct - 200.0 / 3.0).abs() < 1e-9);
  }

  #[test]
  fn pareto_ranks_by_sales_with_cumulative_share() {
    let report = summarize(&fixture(), &MovementFilter::default());
    let ids: Vec<_> = report.pareto.iter().map(|e| e.product_id.0).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let first = &report.pareto[0];
    assert!((first.cumulative_pct - 2000.0 / 24.0).abs() < 1e-9);
    assert_eq!(first.class, AbcClass::A);
    // Starts at 83.3% cumulative share: past the A cutoff.
    assert_eq!(report.pareto[1].class, AbcClass::B);
    assert!((report.pareto[1].cumulative_pct - 100.0).abs() < 1e-9);
    assert_eq!(report.pareto[2].class, AbcClass::C);
  }

  #[test]
  fn heatmap_buckets_by_weekday_and_hour() {
    let report = summarize(&fixture(), &MovementFilter::default());
    assert_eq!(report.activity.total(), 6);
    assert_eq!(report.activity.count(0, 9), 2);
    assert_eq!(report.activity.count(1, 14), 2);
    assert_eq!(report.activity.count(2, 18), 1);
    assert_eq!(report.activity.busiest(), Some((0, 9, 2)));
  }

  #[test]
  fn filters_narrow_input_without_changing_formulas() {
    let projection = fixture();
    let filter = MovementFilter {
      categories: ["Snacks".to_owned()].into_iter().collect(),
      ..Default::default()
    };
    let report = summarize(&projection, &filter);
    assert_eq!(report.kpis.distinct_products, 2);
    assert_eq!(report.kpis.sales_total, Decimal::new(400, 2));

    let full = summarize(&projection, &MovementFilter::default());
    assert_eq!(summary(&report, 2), summary(&full, 2));
  }

  #[test]
  fn movement_type_filter_keeps_exit_side_only() {
    let filter = MovementFilter {
      movement_types: [MovementType::Exit].into_iter().collect(),
      ..Default::default()
    };
    let report = summarize(&fixture(), &filter);
    assert_eq!(report.kpis.distinct_products, 2);
    assert!(
      report
        .movement_totals
        .iter()
        .all(|t| t.movement_type == MovementType::Exit)
    );
    assert_eq!(summary(&report, 1).exit_quantity, 10);
    assert_eq!(summary(&report, 1).entry_quantity, 0);
  }

  #[test]
  fn capital_is_grouped_by_category() {
    let report = summarize(&fixture(), &MovementFilter::default());
    assert_eq!(report.capital_by_category["Bebidas"], 20.0);
    // P2: 1 × 1.00, P3: 6 × 3.00.
    assert_eq!(report.capital_by_category["Snacks"], 19.0);
  }

  #[test]
  fn low_stock_after_small_entry() {
    let mut catalog =
      Catalog::from_products([product(1, "Bebidas", 100, 10, 5)]).unwrap();
    let mut ledger = Ledger::new();
    ledger
      .append(&mut catalog, ProductId(1), 3, MovementType::Entry, at(2, 9))
      .unwrap();
    let report = summarize(&project(ledger.movements(), None), &MovementFilter::default());
    let p = summary(&report, 1);
    assert_eq!(p.current_stock, 8);
    assert_eq!(p.stock_state, StockState::Low);
  }

  #[test]
  fn pareto_shares_are_exact_below_one_unit_of_sales() {
    let mut catalog =
      Catalog::from_products([product(1, "Snacks", 50, 0, 0)]).unwrap();
    let mut ledger = Ledger::new();
    ledger
      .append(&mut catalog, ProductId(1), 1, MovementType::Entry, at(2, 9))
      .unwrap();
    ledger
      .append(&mut catalog, ProductId(1), 1, MovementType::Exit, at(2, 10))
      .unwrap();

    let report = summarize(&project(ledger.movements(), None), &MovementFilter::default());
    let only = &report.pareto[0];
    assert_eq!(only.sales_total, Decimal::new(50, 2));
    assert_eq!(only.share_pct, 100.0);
    assert_eq!(only.cumulative_pct, 100.0);
    assert_eq!(only.class, AbcClass::A);
  }

  #[test]
  fn pareto_without_sales_reports_zero_shares() {
    let mut catalog =
      Catalog::from_products([product(1, "Snacks", 100, 0, 0)]).unwrap();
    let mut ledger = Ledger::new();
    ledger
      .append(&mut catalog, ProductId(1), 2, MovementType::Entry, at(2, 9))
      .unwrap();

    let report = summarize(&project(ledger.movements(), None), &MovementFilter::default());
    assert_eq!(report.pareto[0].share_pct, 0.0);
    assert_eq!(report.pareto[0].cumulative_pct, 0.0);
  }
}
