//! Content parser — turns a free-text bank notification email into a
//! structured `ParsedTransaction`, or rejects it with a typed reason.
//!
//! The payment-confirmation gate runs before any model call: "you paid your
//! card" emails must never be double-counted as purchases.

pub mod prompts;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::llm_client::{strip_json_fences, CompletionError, CompletionService};
use crate::models::transaction::CategoryRow;
use crate::parser::prompts::{EMAIL_PARSE_PROMPT, EMAIL_PARSE_SYSTEM};

/// Phrases that mark an email as a payment confirmation rather than a
/// purchase. Matched against the lower-cased subject + body.
const PAYMENT_PHRASES: &[&str] = &[
    "hemos recibido tu pago",
    "hemos recibido su pago",
    "pago recibido",
    "pago aplicado",
    "hemos aplicado tu pago",
    "hemos aplicado su pago",
    "gracias por tu pago",
    "gracias por su pago",
    "payment received",
    "payment applied",
    "thank you for your payment",
];

/// Currency aliases as they appear in notification emails, normalized to a
/// small canonical set. Unknown values fall back to DOP.
const CURRENCY_ALIASES: &[(&str, &str)] = &[
    ("RD$", "DOP"),
    ("RD", "DOP"),
    ("DOP", "DOP"),
    ("PESOS", "DOP"),
    ("US$", "USD"),
    ("USD", "USD"),
    ("$", "USD"),
    ("EUR", "EUR"),
    ("€", "EUR"),
];

const DEFAULT_CURRENCY: &str = "DOP";
const UNKNOWN_MERCHANT: &str = "Unknown";

#[derive(Debug, Error)]
pub enum ParseError {
    /// Payment confirmation, deliberately excluded before any model call.
    #[error("skipped: payment-notification")]
    SkippedPayment,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("malformed model output: {0}")]
    Malformed(String),

    #[error("completion service unavailable: {0}")]
    Transient(String),
}

/// Structured fields extracted from one email. Transient: consumed by the
/// duplicate detector and mapping engine, then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTransaction {
    pub amount_cents: i64,
    pub currency: String,
    pub merchant: String,
    pub category: String,
    pub date: DateTime<Utc>,
    pub card_last4: Option<String>,
    pub authorization_code: Option<String>,
    pub description: String,
    /// 0–100; callers may gate low-confidence imports without hard-failing.
    pub confidence: u8,
}

pub struct ParseInput<'a> {
    pub subject: &'a str,
    pub body: &'a str,
    pub bank_hint: Option<&'a str>,
    /// The caller's live category list; the model is only ever offered
    /// categories that currently exist.
    pub categories: &'a [CategoryRow],
    /// Category used when the model returns none (or one not in the catalog).
    pub fallback_category: &'a str,
}

/// True if the email is a "payment received/applied" notification.
pub fn is_payment_notification(subject: &str, body: &str) -> bool {
    let text = format!("{} {}", subject, body).to_lowercase();
    PAYMENT_PHRASES.iter().any(|p| text.contains(p))
}

/// Extracts a structured transaction from an email via the completion
/// service. Model output is untrusted input: it is parsed as JSON and every
/// field is validated or defaulted.
pub async fn parse(
    llm: &dyn CompletionService,
    input: ParseInput<'_>,
) -> Result<ParsedTransaction, ParseError> {
    if is_payment_notification(input.subject, input.body) {
        return Err(ParseError::SkippedPayment);
    }

    let category_names = input
        .categories
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let prompt = EMAIL_PARSE_PROMPT
        .replace("{bank}", input.bank_hint.unwrap_or("unknown"))
        .replace("{subject}", input.subject)
        .replace("{body}", input.body)
        .replace("{categories}", &category_names);

    let reply = llm
        .complete(EMAIL_PARSE_SYSTEM, &prompt)
        .await
        .map_err(|e| match e {
            CompletionError::Transient(msg) => ParseError::Transient(msg),
            CompletionError::Empty => ParseError::Transient("empty completion".to_string()),
        })?;

    let parsed: Value = serde_json::from_str(strip_json_fences(&reply))
        .map_err(|e| ParseError::Malformed(e.to_string()))?;

    build_transaction(&parsed, input.categories, input.fallback_category)
}

/// Validates and defaults the model's JSON reply into a `ParsedTransaction`.
fn build_transaction(
    parsed: &Value,
    categories: &[CategoryRow],
    fallback_category: &str,
) -> Result<ParsedTransaction, ParseError> {
    let amount = parsed
        .get("amount")
        .and_then(|v| v.as_f64())
        .filter(|a| a.is_finite() && *a > 0.0)
        .ok_or_else(|| {
            ParseError::InvalidAmount(
                parsed
                    .get("amount")
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "missing".to_string()),
            )
        })?;
    let amount_cents = (amount * 100.0).round() as i64;

    let merchant = parsed
        .get("merchant")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(UNKNOWN_MERCHANT)
        .to_string();

    // Only categories from the live catalog are accepted; anything else is
    // treated as absent and replaced by the caller's fallback.
    let model_category = parsed
        .get("category")
        .and_then(|v| v.as_str())
        .filter(|c| categories.iter().any(|cat| cat.name.eq_ignore_ascii_case(c)))
        .map(str::to_string);

    let model_date = parsed
        .get("date")
        .and_then(|v| v.as_str())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
    let date = model_date
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or_else(Utc::now);

    let currency = parsed
        .get("currency")
        .and_then(|v| v.as_str())
        .map(canonical_currency)
        .unwrap_or(DEFAULT_CURRENCY)
        .to_string();

    let card_last4 = parsed
        .get("card_last4")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|d| d.len() == 4 && d.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string);

    let authorization_code = parsed
        .get("authorization_code")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    let description = parsed
        .get("description")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Compra en {}", merchant));

    let mut confidence: u8 = 30; // amount already validated
    if merchant != UNKNOWN_MERCHANT {
        confidence += 25;
    }
    if model_date.is_some() {
        confidence += 20;
    }
    if card_last4.is_some() {
        confidence += 15;
    }
    if model_category.is_some() {
        confidence += 10;
    }

    debug!(
        "Parsed transaction: merchant={}, amount_cents={}, confidence={}",
        merchant, amount_cents, confidence
    );

    Ok(ParsedTransaction {
        amount_cents,
        currency,
        merchant,
        category: model_category.unwrap_or_else(|| fallback_category.to_string()),
        date,
        card_last4,
        authorization_code,
        description,
        confidence,
    })
}

/// Normalizes a written currency to the canonical set (DOP, USD, EUR).
fn canonical_currency(raw: &str) -> &'static str {
    let cleaned = raw.trim().to_uppercase();
    CURRENCY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == cleaned)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(DEFAULT_CURRENCY)
}
