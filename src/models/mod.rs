mod account;
mod document;
mod product;
mod transaction;

pub use account::{
    Account, AccountType, AccountsReport, Balances, Money, ProfitLoss, Securities, INSTITUTION,
};
pub use document::{Document, DocumentList};
pub use product::{MoneyAmount, Product, ProductDetails};
pub use transaction::{Amount, Transaction, TRANSACTION_CSV_COLUMNS};

use serde::{Deserialize, Deserializer};

/// Accept a string, number or bool as text. Other JSON types read as missing.
pub(crate) fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_json::Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => Ok(None),
    }
}
