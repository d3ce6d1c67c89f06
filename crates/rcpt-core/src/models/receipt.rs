//! Structured receipt fields produced by the completion backend.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fields extracted from a receipt or invoice. Every field is optional.
///
/// Field names follow the JSON shape requested from the completion backend
/// (`vendorName`, `totalAmount`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredReceipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,

    /// Calendar date in ISO 8601 (`YYYY-MM-DD`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Decimal>,

    /// Line items in the order they appear on the receipt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<LineItem>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<Decimal>,

    /// Currency code or symbol as printed (e.g. "USD", "VND").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// A single purchased item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
}

impl StructuredReceipt {
    /// Line items, or an empty slice when none were extracted.
    pub fn line_items(&self) -> &[LineItem] {
        self.items.as_deref().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse_full_receipt() {
        let json = r#"{
            "vendorName": "Coffee House",
            "invoiceNumber": "HD-0012",
            "date": "2024-03-15",
            "totalAmount": 42.50,
            "items": [
                {"name": "Latte", "quantity": 2, "price": 4.25},
                {"name": "Bánh mì", "price": 34}
            ],
            "taxAmount": 3.86,
            "subtotal": 38.64,
            "currency": "USD"
        }"#;

        let receipt: StructuredReceipt = serde_json::from_str(json).unwrap();
        assert_eq!(receipt.vendor_name.as_deref(), Some("Coffee House"));
        assert_eq!(receipt.date, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(receipt.total_amount, Some(Decimal::from_str("42.50").unwrap()));
        assert_eq!(receipt.line_items().len(), 2);
        assert_eq!(receipt.line_items()[1].name, "Bánh mì");
        assert_eq!(receipt.line_items()[1].quantity, None);
    }

    #[test]
    fn test_parse_partial_receipt() {
        let receipt: StructuredReceipt =
            serde_json::from_str(r#"{"totalAmount": 9, "vendorName": null}"#).unwrap();
        assert_eq!(receipt.total_amount, Some(Decimal::from(9)));
        assert!(receipt.vendor_name.is_none());
        assert!(receipt.line_items().is_empty());

        let empty: StructuredReceipt = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, StructuredReceipt::default());
    }

    #[test]
    fn test_reject_non_iso_date() {
        let result = serde_json::from_str::<StructuredReceipt>(r#"{"date": "15/03/2024"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_skips_missing_fields() {
        let receipt = StructuredReceipt {
            vendor_name: Some("Shop".to_string()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&receipt).unwrap(), r#"{"vendorName":"Shop"}"#);
    }
}
