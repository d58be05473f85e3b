//! Built-in catalog of bank notification senders and subject keywords.
//! Filter rules are seeded from here when a connection is created and stay
//! user-editable afterwards.

use uuid::Uuid;

use crate::models::connection::NewFilterRule;

pub struct BankFilter {
    pub bank_name: &'static str,
    pub senders: &'static [&'static str],
    pub keywords: &'static [&'static str],
}

pub const BANK_CATALOG: &[BankFilter] = &[
    BankFilter {
        bank_name: "Banco Popular",
        senders: &[
            "notificaciones@bpd.com.do",
            "alertas@popularenlinea.com",
        ],
        keywords: &["Consumo con tarjeta", "Transacción realizada", "Avance de efectivo"],
    },
    BankFilter {
        bank_name: "Banreservas",
        senders: &["alertas@banreservas.com", "notificaciones@banreservas.com"],
        keywords: &["Notificación de consumo", "Compra con tarjeta"],
    },
    BankFilter {
        bank_name: "BHD",
        senders: &["notificaciones@bhd.com.do", "alertas@bhdleon.com.do"],
        keywords: &["Consumo tarjeta", "Notificación de transacción"],
    },
    BankFilter {
        bank_name: "Scotiabank",
        senders: &["do.alertas@scotiabank.com"],
        keywords: &["Alerta de transacción", "Compra realizada"],
    },
    BankFilter {
        bank_name: "APAP",
        senders: &["notificaciones@apap.com.do"],
        keywords: &["Consumo realizado", "Transacción con tarjeta"],
    },
];

/// Default filter rules for a freshly created connection.
pub fn default_rules(connection_id: Uuid) -> Vec<NewFilterRule> {
    BANK_CATALOG
        .iter()
        .map(|bank| NewFilterRule {
            connection_id,
            bank_name: bank.bank_name.to_string(),
            sender_addresses: bank.senders.iter().map(|s| s.to_string()).collect(),
            subject_keywords: bank.keywords.iter().map(|k| k.to_string()).collect(),
        })
        .collect()
}
