use serde::{Deserialize, Serialize};

use super::deserialize_lenient_string;

/// Money object as returned by the products API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyAmount {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl MoneyAmount {
    /// `currencyCode`, falling back to `currency`.
    pub fn currency(&self) -> Option<&str> {
        self.currency_code
            .as_deref()
            .or(self.currency.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetails {
    #[serde(default)]
    pub betrag_konto_waehrung: Option<MoneyAmount>,
    #[serde(default)]
    pub betrag_in_euro: Option<MoneyAmount>,
    #[serde(default)]
    pub verfuegbar_konto_waehrung: Option<MoneyAmount>,
    #[serde(default)]
    pub verfuegbar_in_euro: Option<MoneyAmount>,
    /// Depot performance in percent (e.g. `12.5` for +12.5 %).
    #[serde(default)]
    pub entwicklung_prozent: Option<f64>,
}

/// One entry of the `produkte` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// `KONTO`, `DEPOT`, `KREDIT`, ...
    #[serde(rename = "type", default)]
    pub product_type: Option<String>,
    /// UI label such as "Giro" or "Sparkonto".
    #[serde(default)]
    pub small_header: Option<String>,
    /// Display name.
    #[serde(default)]
    pub large_header: Option<String>,
    /// IBAN for accounts.
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub unique_id: Option<String>,
    /// Depot number.
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub product_id: Option<String>,
    #[serde(default)]
    pub details: Option<ProductDetails>,
}

impl Product {
    pub fn is_depot(&self) -> bool {
        self.product_type.as_deref() == Some("DEPOT")
    }

    /// UI label, falling back to the raw type.
    pub fn label(&self) -> &str {
        non_empty(self.small_header.as_deref())
            .or(non_empty(self.product_type.as_deref()))
            .unwrap_or("Unknown")
    }

    pub fn name(&self) -> &str {
        non_empty(self.large_header.as_deref()).unwrap_or("Unknown")
    }

    /// IBAN for accounts, depot number for depots.
    pub fn identifier(&self) -> Option<&str> {
        if self.is_depot() {
            non_empty(self.product_id.as_deref()).or(non_empty(self.unique_id.as_deref()))
        } else {
            non_empty(self.unique_id.as_deref())
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
