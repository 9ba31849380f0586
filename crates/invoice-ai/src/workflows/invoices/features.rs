//! Normalization of raw invoice records into the fixed feature vector consumed by scoring.
//!
//! Extraction is deliberately forgiving: partially-parsed documents still need a verdict, so
//! every gap degrades to a flagged default. The only hard failure is an amount that is present
//! but not a non-negative number.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{non_blank, InvalidInvoice, Invoice, RawInvoiceRecord};
use super::risk::RiskConfig;

/// Inputs that were absent from the record and replaced with defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureGaps {
    pub amount_missing: bool,
    pub vendor_missing: bool,
    pub body_missing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub amount: Decimal,
    pub normalized_amount: f64,
    pub vendor_flagged: bool,
    pub vendor_token: Option<String>,
    pub has_purchase_order: bool,
    pub keyword_density: f64,
    pub risky_keywords: Vec<String>,
    pub gaps: FeatureGaps,
}

/// Stateless extractor carrying the vocabulary and scale from [`RiskConfig`].
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    vendor_tokens: Vec<String>,
    keywords: Vec<Vec<String>>,
    amount_scale: Decimal,
}

impl FeatureExtractor {
    pub fn new(config: &RiskConfig) -> Self {
        let keywords = config
            .lowercase_keywords()
            .iter()
            .map(|keyword| words(keyword))
            .filter(|tokens| !tokens.is_empty())
            .collect();

        Self {
            vendor_tokens: config.lowercase_tokens(),
            keywords,
            amount_scale: config.amount_scale,
        }
    }

    pub fn extract(&self, record: &RawInvoiceRecord) -> Result<FeatureVector, InvalidInvoice> {
        let amount = record.amount()?;
        Ok(self.build(amount, record.vendor(), record.po_number(), record.body()))
    }

    /// Stored invoices were validated at ingestion, so this path cannot fail.
    pub fn from_invoice(&self, invoice: &Invoice) -> FeatureVector {
        self.build(
            invoice.total,
            non_blank(invoice.vendor.as_deref()),
            non_blank(invoice.po_number.as_deref()),
            non_blank(invoice.extraction.body.as_deref()),
        )
    }

    fn build(
        &self,
        amount: Option<Decimal>,
        vendor: Option<&str>,
        po_number: Option<&str>,
        body: Option<&str>,
    ) -> FeatureVector {
        let gaps = FeatureGaps {
            amount_missing: amount.is_none(),
            vendor_missing: vendor.is_none(),
            body_missing: body.is_none(),
        };
        let amount = amount.unwrap_or(Decimal::ZERO);

        let normalized_amount = amount
            .checked_div(self.amount_scale)
            .and_then(|ratio| ratio.to_f64())
            .unwrap_or(0.0);

        let vendor_token = vendor.and_then(|name| self.match_vendor(name));
        let (keyword_density, risky_keywords) = match body {
            Some(text) => self.keyword_signal(text),
            None => (0.0, Vec::new()),
        };

        FeatureVector {
            amount,
            normalized_amount,
            vendor_flagged: vendor_token.is_some(),
            vendor_token,
            has_purchase_order: po_number.is_some(),
            keyword_density,
            risky_keywords,
            gaps,
        }
    }

    fn match_vendor(&self, vendor: &str) -> Option<String> {
        let lowered = vendor.to_lowercase();
        self.vendor_tokens
            .iter()
            .find(|token| lowered.contains(token.as_str()))
            .cloned()
    }

    fn keyword_signal(&self, body: &str) -> (f64, Vec<String>) {
        let body_words = words(body);
        if body_words.is_empty() {
            return (0.0, Vec::new());
        }

        let mut hits = 0usize;
        let mut found = Vec::new();
        for keyword in &self.keywords {
            let count = body_words
                .windows(keyword.len())
                .filter(|window| *window == keyword.as_slice())
                .count();
            if count > 0 {
                hits += count;
                found.push(keyword.join(" "));
            }
        }

        (hits as f64 / body_words.len() as f64, found)
    }
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}
