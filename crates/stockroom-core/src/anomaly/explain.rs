//! Human-readable explanations for scored rows.

use std::collections::BTreeMap;

use crate::product::ProductId;

use super::features::FeatureRow;

/// Products with fewer quantities than this get no baseline.
pub const MIN_BASELINE_ROWS: usize = 3;

pub const NORMAL_REASON: &str = "Normal";
pub const GENERIC_REASON: &str = "Unusual pattern detected by the model.";
pub const NORMAL_INTERPRETATION: &str = "Movement within the expected pattern.";
pub const NORMAL_ACTION: &str = "No action.";

pub const INSUFFICIENT_REASON: &str =
  "Insufficient data for the model (at least 8 records required).";
pub const INSUFFICIENT_INTERPRETATION: &str =
  "Not enough data for the model to learn the normal pattern.";
pub const INSUFFICIENT_ACTION: &str = "Record more movements and run again.";

/// Mean and population standard deviation of a product's quantities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
  pub mu:    f64,
  /// Never zero: a constant history gets a floor of 1.0.
  pub sigma: f64,
}

impl Baseline {
  pub fn from_quantities(quantities: &[f64]) -> Option<Self> {
    if quantities.len() < MIN_BASELINE_ROWS {
      return None;
    }
    let n = quantities.len() as f64;
    let mu = quantities.iter().sum::<f64>() / n;
    let variance = quantities.iter().map(|q| (q - mu).powi(2)).sum::<f64>() / n;
    let sigma = variance.sqrt();
    Some(Self { mu, sigma: if sigma > 0.0 { sigma } else { 1.0 } })
  }

  /// Why an anomalous row with quantity `q` stands out from this baseline.
  pub fn reason(&self, q: f64, is_exit: bool) -> String {
    if q > self.mu + 2.0 * self.sigma {
      format!("Unusual quantity vs historical baseline (q={q:.0}).")
    } else if is_exit && q > self.mu + 1.5 * self.sigma {
      format!("Unusual exit vs historical baseline (q={q:.0}).")
    } else {
      GENERIC_REASON.to_owned()
    }
  }
}

/// Baselines for every product with enough history among `rows`.
pub fn baselines(rows: &[FeatureRow]) -> BTreeMap<ProductId, Baseline> {
  let mut quantities: BTreeMap<ProductId, Vec<f64>> = BTreeMap::new();
  for row in rows {
    if let Some(id) = row.row.product_id {
      quantities.entry(id).or_default().push(row.quantity());
    }
  }
  quantities
    .into_iter()
    .filter_map(|(id, qs)| Baseline::from_quantities(&qs).map(|b| (id, b)))
    .collect()
}

pub fn interpretation(product_name: Option<&str>, reason: &str) -> String {
  let product = product_name.unwrap_or("Product");
  format!(
    "The movement of {product} was flagged as anomalous because it does not \
     match the usual recorded pattern. {reason}"
  )
  .trim()
  .to_owned()
}

pub fn suggested_action(is_exit: bool, quantity: f64, stock_after: Option<i64>) -> String {
  let mut action = if is_exit {
    "Check whether this was a large sale, shrinkage or a typing error. Confirm \
     against the receipt or a warehouse count. If it was an error, record a \
     compensating movement to avoid stock-outs."
      .to_owned()
  } else {
    "Check whether this was a real receipt or purchase, or an inventory \
     adjustment. Confirm against the invoice. If it was an error, record a \
     compensating movement so stock is not inflated."
      .to_owned()
  };
  if quantity > 0.0 {
    action.push_str(" Check that the quantity is expressed in the correct unit.");
  }
  if is_exit && stock_after.is_some_and(|s| s < 0) {
    action.push_str(" The resulting stock is negative; correct this inconsistency.");
  }
  action
}
