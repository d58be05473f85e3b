//! Gmail REST adapter for the `MailboxGateway` trait.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::mailbox::{GatewayError, MailMessage, MailQuery, MailboxGateway};
use crate::models::connection::MailboxConnectionRow;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const MESSAGES_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages";
const REQUEST_TIMEOUT_SECS: u64 = 20;

pub struct GmailGateway {
    client: Client,
    client_id: String,
    client_secret: String,
}

impl GmailGateway {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            client_id,
            client_secret,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    messages: Option<Vec<MessageRef>>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    id: String,
    internal_date: Option<String>,
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    mime_type: Option<String>,
    headers: Option<Vec<Header>>,
    body: Option<PartBody>,
    parts: Option<Vec<MessagePart>>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    data: Option<String>,
}

#[async_trait]
impl MailboxGateway for GmailGateway {
    async fn refresh_token(
        &self,
        connection: &MailboxConnectionRow,
    ) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", connection.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Credential(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Credential(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Credential(e.to_string()))?;
        Ok(token.access_token)
    }

    async fn search(
        &self,
        access_token: &str,
        query: &MailQuery,
    ) -> Result<Vec<String>, GatewayError> {
        let q = build_search_query(query);
        debug!("Gmail search: {q}");

        let response = self
            .client
            .get(MESSAGES_URL)
            .bearer_auth(access_token)
            .query(&[("q", q.as_str()), ("maxResults", &query.limit.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api { status, message });
        }

        let list: MessageList = response.json().await?;
        Ok(list
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| m.id)
            .collect())
    }

    async fn fetch(
        &self,
        access_token: &str,
        message_id: &str,
    ) -> Result<MailMessage, GatewayError> {
        let response = self
            .client
            .get(format!("{MESSAGES_URL}/{message_id}"))
            .bearer_auth(access_token)
            .query(&[("format", "full")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api { status, message });
        }

        let message: Message = response.json().await?;
        let payload = message
            .payload
            .ok_or_else(|| GatewayError::Payload("message has no payload".to_string()))?;

        let subject = header_value(&payload, "Subject").unwrap_or_default();
        let sender = header_value(&payload, "From").unwrap_or_default();
        let received_at = message
            .internal_date
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);
        let body = extract_text_body(&payload).unwrap_or_default();

        Ok(MailMessage {
            message_id: message.id,
            subject,
            sender,
            received_at,
            body,
        })
    }
}

/// Builds a Gmail query string from the unioned filter rules, e.g.
/// `from:(a OR b) subject:(x OR y) after:1735689600`.
fn build_search_query(query: &MailQuery) -> String {
    let mut parts = Vec::new();
    if !query.sender_addresses.is_empty() {
        parts.push(format!("from:({})", query.sender_addresses.join(" OR ")));
    }
    if !query.subject_keywords.is_empty() {
        let quoted: Vec<String> = query
            .subject_keywords
            .iter()
            .map(|k| format!("\"{k}\""))
            .collect();
        parts.push(format!("subject:({})", quoted.join(" OR ")));
    }
    parts.push(format!("after:{}", query.after.timestamp()));
    parts.join(" ")
}

fn header_value(payload: &MessagePart, name: &str) -> Option<String> {
    payload
        .headers
        .as_ref()?
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

/// Walks the MIME tree for the first text/plain part (falling back to
/// text/html, then any part with data) and decodes its base64url body.
fn extract_text_body(payload: &MessagePart) -> Option<String> {
    find_part(payload, "text/plain")
        .or_else(|| find_part(payload, "text/html"))
        .or_else(|| find_any_body(payload))
        .and_then(decode_body)
}

fn find_part<'a>(part: &'a MessagePart, mime: &str) -> Option<&'a str> {
    if part.mime_type.as_deref() == Some(mime) {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
            return Some(data);
        }
    }
    part.parts
        .as_ref()?
        .iter()
        .find_map(|p| find_part(p, mime))
}

fn find_any_body(part: &MessagePart) -> Option<&str> {
    if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
        return Some(data);
    }
    part.parts.as_ref()?.iter().find_map(find_any_body)
}

fn decode_body(data: &str) -> Option<String> {
    let decoded = URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()?;
    Some(String::from_utf8_lossy(&decoded).into_owned())
}
