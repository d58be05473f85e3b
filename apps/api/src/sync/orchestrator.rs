//! Per-connection sync run: search the mailbox, claim each new message as a
//! candidate, parse it, check duplicates, resolve the category and record
//! the transaction. One message failing never stops the run; a storage
//! failure does, leaving the cursor untouched so nothing is lost.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SyncSettings;
use crate::llm_client::CompletionService;
use crate::mailbox::{MailQuery, MailboxGateway};
use crate::mapping::engine::{MappingConfig, MappingEngine};
use crate::models::candidate::{CandidateStatus, NewCandidate};
use crate::models::connection::{BankFilterRuleRow, SyncStatus};
use crate::models::mapping::MappingProvenance;
use crate::models::transaction::NewTransaction;
use crate::parser::{parse, ParseError, ParseInput};
use crate::store::Store;
use crate::sync::{dedup, NewSyncRun, SyncError, SyncRunResult};

const TRANSACTION_SOURCE: &str = "email_sync";

/// Runs one full sync for a connection. On failure the connection is marked
/// failed with the error, and the cursor stays where it was.
pub async fn sync_connection(
    store: Arc<dyn Store>,
    mailbox: Arc<dyn MailboxGateway>,
    llm: Arc<dyn CompletionService>,
    settings: &SyncSettings,
    mapping: MappingConfig,
    connection_id: Uuid,
) -> Result<SyncRunResult, SyncError> {
    match run_sync(store.clone(), mailbox, llm, settings, mapping, connection_id).await {
        Ok(result) => Ok(result),
        Err(err) => {
            if !matches!(err, SyncError::NotFound(_)) {
                let message = err.to_string();
                warn!("Sync failed for connection {connection_id}: {message}");
                if let Err(record_err) = store
                    .record_sync_outcome(connection_id, SyncStatus::Failed, Some(&message), None)
                    .await
                {
                    warn!("Could not record failed sync outcome: {record_err}");
                }
            }
            Err(err)
        }
    }
}

async fn run_sync(
    store: Arc<dyn Store>,
    mailbox: Arc<dyn MailboxGateway>,
    llm: Arc<dyn CompletionService>,
    settings: &SyncSettings,
    mapping: MappingConfig,
    connection_id: Uuid,
) -> Result<SyncRunResult, SyncError> {
    let started = Instant::now();
    let run_start = Utc::now();

    let connection = store
        .get_connection(connection_id)
        .await?
        .ok_or(SyncError::NotFound(connection_id))?;
    if !connection.active {
        return Err(SyncError::Inactive(connection_id));
    }

    // Candidates left in `processing` by an interrupted earlier run are
    // marked failed before anything else happens.
    let swept = store
        .sweep_stale_candidates(connection_id, Duration::minutes(settings.stale_after_minutes))
        .await?;
    if swept > 0 {
        warn!("Swept {swept} stale candidates for connection {connection_id}");
    }

    let access_token = mailbox
        .refresh_token(&connection)
        .await
        .map_err(|e| SyncError::Credential(e.to_string()))?;

    let rules = store.filter_rules(connection_id).await?;
    let mut result = SyncRunResult::default();
    if rules.is_empty() {
        debug!("Connection {connection_id} has no filter rules, nothing to search");
        store
            .record_sync_outcome(connection_id, SyncStatus::Success, None, None)
            .await?;
        return Ok(result);
    }

    let after = connection
        .last_synced_at
        .unwrap_or_else(|| run_start - Duration::days(settings.lookback_days));
    let query = MailQuery {
        sender_addresses: union(rules.iter().flat_map(|r| r.sender_addresses.iter())),
        subject_keywords: union(rules.iter().flat_map(|r| r.subject_keywords.iter())),
        after,
        limit: settings.search_limit,
    };

    let message_ids = mailbox
        .search(&access_token, &query)
        .await
        .map_err(|e| SyncError::Gateway(e.to_string()))?;
    result.emails_found = message_ids.len() as u64;

    let engine = MappingEngine::new(store.clone(), mapping);
    let categories = store.expense_categories(connection.user_id).await?;

    for message_id in &message_ids {
        // Cheap precheck before fetching the full message body.
        if store.candidate_exists(connection_id, message_id).await? {
            result.emails_skipped += 1;
            continue;
        }

        let message = match mailbox.fetch(&access_token, message_id).await {
            Ok(message) => message,
            Err(err) => {
                warn!("Fetch failed for message {message_id}: {err}");
                result.errors.push(format!("fetch {message_id}: {err}"));
                continue;
            }
        };

        let candidate = NewCandidate {
            connection_id,
            message_id: message.message_id.clone(),
            subject: message.subject.clone(),
            sender: message.sender.clone(),
            received_at: message.received_at,
            body: truncate_utf8(&message.body, settings.body_limit_bytes).to_string(),
        };
        let Some(candidate_id) = store.claim_candidate(&candidate).await? else {
            // Another run claimed it between the precheck and here.
            result.emails_skipped += 1;
            continue;
        };

        let bank_hint = bank_for_sender(&rules, &message.sender);
        let input = ParseInput {
            subject: &message.subject,
            body: &candidate.body,
            bank_hint: bank_hint.as_deref(),
            categories: &categories,
            fallback_category: &settings.fallback_category,
        };

        match parse(llm.as_ref(), input).await {
            Err(ParseError::SkippedPayment) => {
                store
                    .finish_candidate(
                        candidate_id,
                        CandidateStatus::Skipped,
                        None,
                        None,
                        Some("payment notification"),
                    )
                    .await?;
                result.emails_skipped += 1;
                result.emails_processed += 1;
            }
            Err(err) => {
                store
                    .finish_candidate(
                        candidate_id,
                        CandidateStatus::Failed,
                        None,
                        None,
                        Some(&err.to_string()),
                    )
                    .await?;
                result.errors.push(format!("{message_id}: {err}"));
                result.emails_processed += 1;
            }
            Ok(mut parsed) => {
                if dedup::is_duplicate(store.as_ref(), connection.user_id, &parsed).await? {
                    let data = serde_json::to_value(&parsed).unwrap_or(Value::Null);
                    store
                        .finish_candidate(
                            candidate_id,
                            CandidateStatus::Duplicate,
                            Some(&data),
                            None,
                            None,
                        )
                        .await?;
                    result.duplicates += 1;
                    result.emails_processed += 1;
                    continue;
                }

                let resolution = engine.resolve(connection.user_id, &parsed.merchant).await?;
                let resolved_by_mapping = resolution.is_some();
                if let Some(resolution) = resolution {
                    parsed.category = resolution.category;
                }

                // A storage failure here aborts the whole run: the candidate
                // stays `processing` for the next run's sweep and the cursor
                // never advances past the unrecorded transaction.
                let transaction_id = store
                    .insert_transaction(&NewTransaction {
                        user_id: connection.user_id,
                        amount_cents: parsed.amount_cents,
                        currency: parsed.currency.clone(),
                        merchant: parsed.merchant.clone(),
                        category: parsed.category.clone(),
                        tx_date: parsed.date,
                        card_last4: parsed.card_last4.clone(),
                        authorization_code: parsed.authorization_code.clone(),
                        description: parsed.description.clone(),
                        source: TRANSACTION_SOURCE.to_string(),
                    })
                    .await?;

                // Model-derived categories feed the mapping engine as weak
                // signals, but only real ones: unknown merchants and the
                // fallback category teach nothing.
                if !resolved_by_mapping
                    && !parsed.merchant.eq_ignore_ascii_case("unknown")
                    && parsed.category != settings.fallback_category
                {
                    engine
                        .learn(
                            connection.user_id,
                            &parsed.merchant,
                            &parsed.category,
                            MappingProvenance::AiInferred,
                        )
                        .await?;
                }

                let data = serde_json::to_value(&parsed).unwrap_or(Value::Null);
                store
                    .finish_candidate(
                        candidate_id,
                        CandidateStatus::Success,
                        Some(&data),
                        Some(transaction_id),
                        None,
                    )
                    .await?;
                result.transactions_created += 1;
                result.emails_processed += 1;
            }
        }
    }

    store
        .record_sync_outcome(connection_id, SyncStatus::Success, None, Some(run_start))
        .await?;
    store
        .record_sync_run(&NewSyncRun {
            connection_id,
            emails_found: result.emails_found as i64,
            emails_processed: result.emails_processed as i64,
            emails_skipped: result.emails_skipped as i64,
            duplicates: result.duplicates as i64,
            transactions_created: result.transactions_created as i64,
            error_count: result.errors.len() as i64,
            duration_ms: started.elapsed().as_millis() as i64,
        })
        .await?;

    info!(
        "Synced connection {connection_id}: {} found, {} created, {} duplicates, {} skipped, {} errors",
        result.emails_found,
        result.transactions_created,
        result.duplicates,
        result.emails_skipped,
        result.errors.len()
    );
    Ok(result)
}

fn union<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = Vec::new();
    for item in items {
        if !seen.contains(item) {
            seen.push(item.clone());
        }
    }
    seen
}

/// Bank name of the first rule whose sender list matches the message sender,
/// used as a parsing hint only.
fn bank_for_sender(rules: &[BankFilterRuleRow], sender: &str) -> Option<String> {
    let sender = sender.to_lowercase();
    rules
        .iter()
        .find(|rule| {
            rule.sender_addresses
                .iter()
                .any(|address| sender.contains(&address.to_lowercase()))
        })
        .map(|rule| rule.bank_name.clone())
}

/// Byte-bounded truncation that never splits a UTF-8 character.
fn truncate_utf8(s: &str, limit: usize) -> &str {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
