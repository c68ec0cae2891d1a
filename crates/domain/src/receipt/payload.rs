use serde::{Deserialize, Serialize};

/// One order line as handed over by the ordering system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptItem {
    pub quantity: f64,
    pub product_name: String,
    pub subtotal: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ReceiptItem {
    pub fn new(quantity: f64, product_name: impl Into<String>, subtotal: f64) -> Self {
        Self {
            quantity,
            product_name: product_name.into(),
            subtotal,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Printer job input.
///
/// `total` is rendered as given; it may include taxes or fees that the
/// item subtotals do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptPayload {
    pub order_number: String,
    pub customer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    pub items: Vec<ReceiptItem>,
    pub total: f64,
}
