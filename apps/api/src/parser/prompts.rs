// Content parser LLM prompt templates.
// All prompts for email extraction are defined here.

pub const EMAIL_PARSE_SYSTEM: &str = "\
You are a precise extractor of financial transactions from bank notification emails. \
Emails are mostly in Spanish (Dominican Republic banks), occasionally in English. \
You MUST respond with valid JSON only — no markdown fences, no explanations. \
Never invent an amount: if no amount is present, return null. \
Only use a category from the provided list — never make up a new one.";

pub const EMAIL_PARSE_PROMPT: &str = r#"Extract the purchase described in this bank notification email.

BANK: {bank}
SUBJECT: {subject}
BODY:
{body}

AVAILABLE CATEGORIES (use exactly one of these, or null if none fits):
{categories}

OUTPUT SCHEMA (return exactly this structure, null for unknown fields):
{
  "amount": number | null,
  "currency": "string" | null,
  "merchant": "string" | null,
  "category": "string" | null,
  "date": "YYYY-MM-DD" | null,
  "card_last4": "string" | null,
  "authorization_code": "string" | null,
  "description": "string" | null
}

RULES:
1. amount is the purchase total as a positive decimal number, no thousands separators.
2. currency is the symbol or code as written in the email (RD$, US$, USD, EUR, ...).
3. merchant is the business name as printed, without transaction-type prefixes.
4. date is the transaction date from the email body, not today's date.
5. Return ONLY the JSON object — nothing else, no code fences."#;
