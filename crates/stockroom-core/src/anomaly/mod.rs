//! Anomaly detection over ledger movements.
//!
//! The pipeline is: [`features::build_features`] → [`OutlierModel::score`]
//! → per-product explanations. With fewer than [`MIN_ROWS`] usable rows the
//! model is never consulted and every row is reported as normal.

pub mod explain;
pub mod features;
pub mod forest;

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub use self::{
  features::{FeatureRow, FeatureSet, LedgerRow, build_features},
  forest::{IsolationForest, OutlierModel, Scores},
};
use crate::{
  Error, Result,
  movement::{Movement, MovementId, MovementType},
  product::ProductId,
  timestamp,
};

/// Minimum usable rows before the model is trained.
pub const MIN_ROWS: usize = 8;

// ─── Annotated rows ──────────────────────────────────────────────────────────

/// A scored ledger row with its explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedRow {
  pub id:               Option<MovementId>,
  #[serde(with = "timestamp::serde_format")]
  pub timestamp:        NaiveDateTime,
  pub product_id:       Option<ProductId>,
  pub product_name:     Option<String>,
  pub movement_type:    Option<String>,
  pub quantity:         f64,
  pub stock_after:      Option<i64>,
  pub hour_of_day:      u32,
  pub day_of_week:      u32,
  pub anomaly:          bool,
  pub anomaly_score:    f64,
  #[serde(rename = "motivo")]
  pub reason:           String,
  #[serde(rename = "interpretacion")]
  pub interpretation:   String,
  #[serde(rename = "accion_sugerida")]
  pub suggested_action: String,
}

impl AnnotatedRow {
  fn base(row: FeatureRow, anomaly: bool, anomaly_score: f64) -> Self {
    let [quantity, _, hour, day] = row.features;
    Self {
      id: row.row.id,
      timestamp: row.timestamp,
      product_id: row.row.product_id,
      product_name: row.row.product_name,
      movement_type: row.row.movement_type,
      quantity,
      stock_after: row.row.stock_after,
      hour_of_day: hour as u32,
      day_of_week: day as u32,
      anomaly,
      anomaly_score,
      reason: String::new(),
      interpretation: String::new(),
      suggested_action: String::new(),
    }
  }

  fn insufficient(row: FeatureRow) -> Self {
    Self {
      reason: explain::INSUFFICIENT_REASON.to_owned(),
      interpretation: explain::INSUFFICIENT_INTERPRETATION.to_owned(),
      suggested_action: explain::INSUFFICIENT_ACTION.to_owned(),
      ..Self::base(row, false, 0.0)
    }
  }
}

// ─── Detector ────────────────────────────────────────────────────────────────

/// Scores ledger rows with an [`OutlierModel`] and explains the verdicts.
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector<M = IsolationForest> {
  model: M,
}

impl<M: OutlierModel> AnomalyDetector<M> {
  pub fn new(model: M) -> Self { Self { model } }

  pub fn model(&self) -> &M { &self.model }

  /// Score loosely-typed rows. Output is in chronological order and omits
  /// rows whose timestamp could not be parsed.
  pub fn detect(&self, rows: &[LedgerRow]) -> Result<Vec<AnnotatedRow>> {
    let set = build_features(rows)?;
    if set.len() < MIN_ROWS {
      return Ok(set.rows.into_iter().map(AnnotatedRow::insufficient).collect());
    }

    let Scores { anomalous, scores } = self.model.score(&set.matrix());
    for actual in [anomalous.len(), scores.len()] {
      if actual != set.len() {
        return Err(Error::ModelOutput { expected: set.len(), actual });
      }
    }
    let baselines = explain::baselines(&set.rows);

    Ok(
      set
        .rows
        .into_iter()
        .zip(anomalous.into_iter().zip(scores))
        .map(|(row, (anomaly, score))| annotate(row, anomaly, score, &baselines))
        .collect(),
    )
  }

  pub fn detect_movements(&self, movements: &[Movement]) -> Result<Vec<AnnotatedRow>> {
    let rows: Vec<LedgerRow> = movements.iter().map(LedgerRow::from).collect();
    self.detect(&rows)
  }
}

fn annotate(
  row: FeatureRow,
  anomaly: bool,
  score: f64,
  baselines: &BTreeMap<ProductId, explain::Baseline>,
) -> AnnotatedRow {
  if !anomaly {
    return AnnotatedRow {
      reason: explain::NORMAL_REASON.to_owned(),
      interpretation: explain::NORMAL_INTERPRETATION.to_owned(),
      suggested_action: explain::NORMAL_ACTION.to_owned(),
      ..AnnotatedRow::base(row, false, score)
    };
  }

  let quantity = row.quantity();
  let is_exit = row.is_exit();
  let reason = row
    .row
    .product_id
    .and_then(|id| baselines.get(&id))
    .map(|b| b.reason(quantity, is_exit))
    .unwrap_or_else(|| explain::GENERIC_REASON.to_owned());
  let interpretation = explain::interpretation(row.row.product_name.as_deref(), &reason);
  let suggested_action =
    explain::suggested_action(is_exit, quantity, row.row.stock_after);

  AnnotatedRow {
    reason,
    interpretation,
    suggested_action,
    ..AnnotatedRow::base(row, true, score)
  }
}

// ─── Settings ────────────────────────────────────────────────────────────────

/// Tunables for the default model, as read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalySettings {
  pub sensitivity: f64,
  pub trees:       usize,
  pub seed:        u64,
}

impl Default for AnomalySettings {
  fn default() -> Self {
    Self {
      sensitivity: forest::DEFAULT_SENSITIVITY,
      trees:       forest::DEFAULT_TREES,
      seed:        forest::DEFAULT_SEED,
    }
  }
}

impl AnomalySettings {
  /// Same settings with a different sensitivity, if one is given.
  pub fn with_sensitivity(self, sensitivity: Option<f64>) -> Self {
    Self { sensitivity: sensitivity.unwrap_or(self.sensitivity), ..self }
  }

  pub fn model(&self) -> IsolationForest {
    IsolationForest::new(self.sensitivity)
      .with_trees(self.trees)
      .with_seed(self.seed)
  }

  pub fn detector(&self) -> AnomalyDetector { AnomalyDetector::new(self.model()) }
}

// ─── Summary ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalySummary {
  pub total:      usize,
  pub anomalies:  usize,
  pub percentage: f64,
}

impl AnomalySummary {
  pub fn of(rows: &[AnnotatedRow]) -> Self {
    let total = rows.len();
    let anomalies = rows.iter().filter(|r| r.anomaly).count();
    let percentage = if total > 0 {
      anomalies as f64 / total as f64 * 100.0
    } else {
      0.0
    };
    Self { total, anomalies, percentage }
  }
}

/// Result of a scan: every scored row, the headline figures and how many new
/// anomalies reached the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
  pub summary:  AnomalySummary,
  pub archived: usize,
  pub rows:     Vec<AnnotatedRow>,
}

// ─── Archive ─────────────────────────────────────────────────────────────────

/// One archived anomaly. The archive is append-only and de-duplicated on
/// [`AnomalyRecord::dedup_key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
  #[serde(default)]
  pub id:               Option<MovementId>,
  #[serde(with = "timestamp::serde_format", alias = "Fecha_Hora")]
  pub timestamp:        NaiveDateTime,
  #[serde(default)]
  pub product_id:       Option<ProductId>,
  #[serde(default)]
  pub product_name:     Option<String>,
  pub movement_type:    String,
  pub quantity:         i64,
  #[serde(default)]
  pub stock_after:      Option<i64>,
  pub anomaly_score:    f64,
  #[serde(rename = "motivo")]
  pub reason:           String,
  #[serde(rename = "interpretacion")]
  pub interpretation:   String,
  #[serde(rename = "accion_sugerida")]
  pub suggested_action: String,
}

/// Identity of an archived anomaly: product, time, direction and quantity.
pub type DedupKey = (Option<ProductId>, NaiveDateTime, String, i64);

impl AnomalyRecord {
  /// Archive form of an anomalous row; `None` for normal rows.
  pub fn from_annotated(row: &AnnotatedRow) -> Option<Self> {
    if !row.anomaly {
      return None;
    }
    Some(Self {
      id: row.id,
      timestamp: row.timestamp,
      product_id: row.product_id,
      product_name: row.product_name.clone(),
      movement_type: normalise_movement_type(row.movement_type.as_deref()),
      quantity: row.quantity.round() as i64,
      stock_after: row.stock_after,
      anomaly_score: row.anomaly_score,
      reason: row.reason.clone(),
      interpretation: row.interpretation.clone(),
      suggested_action: row.suggested_action.clone(),
    })
  }

  pub fn dedup_key(&self) -> DedupKey {
    (
      self.product_id,
      self.timestamp,
      normalise_movement_type(Some(&self.movement_type)),
      self.quantity,
    )
  }
}

/// Persisted label for known directions, trimmed input otherwise.
fn normalise_movement_type(raw: Option<&str>) -> String {
  let raw = raw.unwrap_or_default().trim();
  raw
    .parse::<MovementType>()
    .map(|t| t.as_str().to_owned())
    .unwrap_or_else(|_| raw.to_owned())
}

/// Archive candidates among scored rows.
pub fn archive_candidates(rows: &[AnnotatedRow]) -> Vec<AnomalyRecord> {
  rows.iter().filter_map(AnomalyRecord::from_annotated).collect()
}

/// Append the records of `incoming` not already present in `archive` and
/// return how many were added. Duplicates inside `incoming` count once.
pub fn merge_archive(
  archive: &mut Vec<AnomalyRecord>,
  incoming: impl IntoIterator<Item = AnomalyRecord>,
) -> usize {
  let mut seen: HashSet<DedupKey> = archive.iter().map(AnomalyRecord::dedup_key).collect();
  let before = archive.len();
  for record in incoming {
    if seen.insert(record.dedup_key()) {
      archive.push(record);
    }
  }
  archive.len() - before
}
