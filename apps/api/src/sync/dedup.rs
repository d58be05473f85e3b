//! Duplicate detection: the same purchase often arrives through more than
//! one notification (bank + card processor), so a same-day, same-amount,
//! same-merchant probe runs before any transaction is created.

use uuid::Uuid;

use crate::mapping::normalize::normalize;
use crate::parser::ParsedTransaction;
use crate::store::{Store, StoreError};

/// First significant word of the normalized merchant, used as a substring
/// refinement. `None` for unresolved merchants: amount + date must stand
/// alone rather than never matching.
pub fn merchant_hint(merchant: &str) -> Option<String> {
    if merchant.eq_ignore_ascii_case("unknown") {
        return None;
    }
    normalize(merchant)
        .split_whitespace()
        .find(|w| w.len() > 2)
        .map(str::to_string)
}

/// True when an already-recorded transaction matches this parse by user,
/// exact amount and calendar date. Time-of-day differences are irrelevant.
pub async fn is_duplicate(
    store: &dyn Store,
    user_id: Uuid,
    parsed: &ParsedTransaction,
) -> Result<bool, StoreError> {
    let hint = merchant_hint(&parsed.merchant);
    store
        .duplicate_exists(
            user_id,
            parsed.amount_cents,
            parsed.date.date_naive(),
            hint.as_deref(),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transaction::NewTransaction;
    use crate::store::memory::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn parsed(amount_cents: i64, merchant: &str, date: chrono::DateTime<Utc>) -> ParsedTransaction {
        ParsedTransaction {
            amount_cents,
            currency: "DOP".to_string(),
            merchant: merchant.to_string(),
            category: "Otros".to_string(),
            date,
            card_last4: None,
            authorization_code: None,
            description: String::new(),
            confidence: 55,
        }
    }

    async fn record(store: &MemoryStore, user_id: Uuid, amount_cents: i64, merchant: &str, date: chrono::DateTime<Utc>) {
        store
            .insert_transaction(&NewTransaction {
                user_id,
                amount_cents,
                currency: "DOP".to_string(),
                merchant: merchant.to_string(),
                category: "Otros".to_string(),
                tx_date: date,
                card_last4: None,
                authorization_code: None,
                description: String::new(),
                source: "email_sync".to_string(),
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_merchant_hint_skips_unknown_and_short_words() {
        assert_eq!(merchant_hint("Unknown"), None);
        assert_eq!(merchant_hint("FARMACIA CAROL"), Some("FARMACIA".to_string()));
        assert_eq!(merchant_hint("EL IT"), None);
    }

    #[tokio::test]
    async fn test_same_day_different_time_is_duplicate() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let morning = Utc.with_ymd_and_hms(2026, 8, 12, 8, 15, 3).unwrap();
        let evening = Utc.with_ymd_and_hms(2026, 8, 12, 20, 44, 59).unwrap();
        record(&store, user, 35_000, "FARMACIA CAROL", morning).await;

        assert!(is_duplicate(&store, user, &parsed(35_000, "FARMACIA CAROL", evening))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_one_cent_difference_is_not_duplicate() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let date = Utc.with_ymd_and_hms(2026, 8, 12, 8, 0, 0).unwrap();
        record(&store, user, 35_000, "FARMACIA CAROL", date).await;

        assert!(!is_duplicate(&store, user, &parsed(35_001, "FARMACIA CAROL", date))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_different_day_is_not_duplicate() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        record(
            &store,
            user,
            35_000,
            "FARMACIA CAROL",
            Utc.with_ymd_and_hms(2026, 8, 12, 23, 59, 0).unwrap(),
        )
        .await;

        assert!(!is_duplicate(
            &store,
            user,
            &parsed(
                35_000,
                "FARMACIA CAROL",
                Utc.with_ymd_and_hms(2026, 8, 13, 0, 1, 0).unwrap()
            )
        )
        .await
        .unwrap());
    }

    #[tokio::test]
    async fn test_other_users_transactions_do_not_match() {
        let store = MemoryStore::new();
        let date = Utc.with_ymd_and_hms(2026, 8, 12, 8, 0, 0).unwrap();
        record(&store, Uuid::new_v4(), 35_000, "FARMACIA CAROL", date).await;

        assert!(
            !is_duplicate(&store, Uuid::new_v4(), &parsed(35_000, "FARMACIA CAROL", date))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_unknown_merchant_matches_on_amount_and_date_alone() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let date = Utc.with_ymd_and_hms(2026, 8, 12, 8, 0, 0).unwrap();
        record(&store, user, 35_000, "FARMACIA CAROL", date).await;

        assert!(is_duplicate(&store, user, &parsed(35_000, "Unknown", date))
            .await
            .unwrap());
    }
}
