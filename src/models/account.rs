use std::fmt;

use serde::{Deserialize, Serialize};

use super::{MoneyAmount, Product};

/// Value of `institution` in every accounts report.
pub const INSTITUTION: &str = "elba";

const DEFAULT_CURRENCY: &str = "EUR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Checking,
    Savings,
    Loan,
    Depot,
    Other,
}

impl AccountType {
    /// Classify an ELBA UI label ("Giro", "Sparkonto", "Kredit", "Depot", ...).
    pub fn from_label(label: &str) -> Self {
        let label = label.to_lowercase();
        if label.contains("depot") {
            AccountType::Depot
        } else if label.contains("giro") || label.contains("konto") {
            AccountType::Checking
        } else if label.contains("spar") {
            AccountType::Savings
        } else if label.contains("kredit") || label.contains("loan") {
            AccountType::Loan
        } else {
            AccountType::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "checking",
            AccountType::Savings => "savings",
            AccountType::Loan => "loan",
            AccountType::Depot => "depot",
            AccountType::Other => "other",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balances {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booked: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitLoss {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    pub currency: String,
    /// Fraction, so `0.125` is +12.5 %.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Securities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit_loss: Option<ProfitLoss>,
}

/// Canonical account record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iban: Option<String>,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balances: Option<Balances>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub securities: Option<Securities>,
}

impl Account {
    pub fn from_product(product: &Product) -> Self {
        let mut account_type = AccountType::from_label(product.label());
        if product.is_depot() {
            account_type = AccountType::Depot;
        }

        let name = product.name().to_string();
        let iban = product.identifier().map(str::to_string);
        let id = iban.clone().unwrap_or_else(|| name.clone());
        let details = product.details.clone().unwrap_or_default();

        if account_type == AccountType::Depot {
            let value = details.betrag_konto_waehrung;
            let currency = currency_of(&[value.as_ref()]);
            let pl = details.betrag_in_euro;
            let profit_loss = if pl.as_ref().and_then(|m| m.amount).is_some()
                || details.entwicklung_prozent.is_some()
            {
                Some(ProfitLoss {
                    amount: pl.as_ref().and_then(|m| m.amount),
                    currency: pl
                        .as_ref()
                        .and_then(MoneyAmount::currency)
                        .unwrap_or(&currency)
                        .to_string(),
                    percent: details.entwicklung_prozent.map(|p| p / 100.0),
                })
            } else {
                None
            };

            return Self {
                id,
                account_type,
                name,
                iban,
                securities: Some(Securities {
                    value: money(value.as_ref(), &currency),
                    profit_loss,
                }),
                currency,
                balances: None,
            };
        }

        let booked = details.betrag_konto_waehrung;
        let available = details.verfuegbar_konto_waehrung.or_else(|| booked.clone());
        let currency = currency_of(&[booked.as_ref(), available.as_ref()]);

        Self {
            id,
            account_type,
            name,
            iban,
            balances: Some(Balances {
                booked: money(booked.as_ref(), &currency),
                available: money(available.as_ref(), &currency),
            }),
            currency,
            securities: None,
        }
    }

    /// Primary amount for display: booked balance or depot value.
    pub fn headline_amount(&self) -> Option<&Money> {
        self.balances
            .as_ref()
            .and_then(|b| b.booked.as_ref())
            .or_else(|| self.securities.as_ref().and_then(|s| s.value.as_ref()))
    }

    pub fn available_amount(&self) -> Option<&Money> {
        self.balances.as_ref().and_then(|b| b.available.as_ref())
    }
}

fn currency_of(candidates: &[Option<&MoneyAmount>]) -> String {
    candidates
        .iter()
        .flatten()
        .find_map(|m| m.currency())
        .unwrap_or(DEFAULT_CURRENCY)
        .to_string()
}

fn money(amount: Option<&MoneyAmount>, currency: &str) -> Option<Money> {
    amount.and_then(|m| m.amount).map(|amount| Money {
        amount,
        currency: currency.to_string(),
    })
}

/// Output of `elba accounts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsReport {
    pub institution: String,
    /// RFC 3339 timestamp in local time.
    pub fetched_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_path: Option<String>,
    pub accounts: Vec<Account>,
}

impl AccountsReport {
    pub fn new(fetched_at: String, raw_path: Option<String>, products: &[Product]) -> Self {
        Self {
            institution: INSTITUTION.to_string(),
            fetched_at,
            raw_path,
            accounts: products.iter().map(Account::from_product).collect(),
        }
    }
}
