use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::{deserialize_lenient_string, MoneyAmount};

/// Column order of the transactions CSV export.
pub const TRANSACTION_CSV_COLUMNS: [&str; 14] = [
    "id",
    "buchungstag",
    "valuta",
    "betrag",
    "waehrung",
    "transaktionsteilnehmer",
    "verwendungszweck",
    "zahlungsreferenz",
    "kategorieCode",
    "iban",
    "auftraggeberIban",
    "auftraggeberBic",
    "bestandreferenz",
    "ersterfasserreferenz",
];

/// `betrag` is usually a money object, occasionally a bare number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Money(MoneyAmount),
    Plain(f64),
}

impl Amount {
    pub fn value(&self) -> Option<f64> {
        match self {
            Amount::Money(m) => m.amount,
            Amount::Plain(v) => Some(*v),
        }
    }

    /// Currency of a money object; bare numbers are EUR.
    pub fn currency(&self) -> Option<&str> {
        match self {
            Amount::Money(m) => m.currency(),
            Amount::Plain(_) => Some("EUR"),
        }
    }
}

/// Typed view of the fields used for CSV and table output.
///
/// Every field is optional and tolerant of unexpected JSON types, so one odd
/// value never hides the rest of a record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Fields {
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    buchungstag: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    valuta: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_amount")]
    betrag: Option<Amount>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    transaktionsteilnehmer_zeile1: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    verwendungszweck_zeile1: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    zahlungsreferenz: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    kategorie_code: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    iban: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    auftraggeber_iban: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    auftraggeber_bic: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    bestandreferenz: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    ersterfasserreferenz: Option<String>,
}

fn deserialize_lenient_amount<'de, D>(deserializer: D) -> Result<Option<Amount>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(|v| serde_json::from_value(v).ok()))
}

/// One entry of the `kontoumsaetze` response.
///
/// The record is kept exactly as the bank sent it and serializes back to that
/// JSON. Typed accessors read a lenient view of the common fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    fields: Fields,
    raw: Value,
}

impl Transaction {
    pub fn from_raw(raw: Value) -> Self {
        let fields = match serde_json::from_value::<Fields>(raw.clone()) {
            Ok(fields) => fields,
            Err(e) => {
                tracing::debug!(error = %e, "Transaction record is not an object");
                Fields::default()
            }
        };
        Self { fields, raw }
    }

    /// The record as received.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.id.as_deref()
    }

    pub fn amount(&self) -> Option<&Amount> {
        self.fields.betrag.as_ref()
    }

    /// Values in [`TRANSACTION_CSV_COLUMNS`] order. Missing values are empty.
    pub fn csv_record(&self) -> [String; 14] {
        let f = &self.fields;
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        let amount = self
            .amount()
            .and_then(Amount::value)
            .map(|v| v.to_string())
            .unwrap_or_default();
        let currency = self
            .amount()
            .and_then(Amount::currency)
            .unwrap_or_default()
            .to_string();

        [
            text(&f.id),
            text(&f.buchungstag),
            text(&f.valuta),
            amount,
            currency,
            text(&f.transaktionsteilnehmer_zeile1),
            text(&f.verwendungszweck_zeile1),
            text(&f.zahlungsreferenz),
            text(&f.kategorie_code),
            text(&f.iban),
            text(&f.auftraggeber_iban),
            text(&f.auftraggeber_bic),
            text(&f.bestandreferenz),
            text(&f.ersterfasserreferenz),
        ]
    }

    /// Booking date (`YYYY-MM-DD`) without any time part.
    pub fn booking_date(&self) -> &str {
        let day = self.fields.buchungstag.as_deref().unwrap_or_default();
        day.get(..10).unwrap_or(day)
    }

    /// Counterparty or, failing that, the purpose line.
    pub fn description(&self) -> &str {
        self.fields
            .transaktionsteilnehmer_zeile1
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.fields.verwendungszweck_zeile1.as_deref())
            .unwrap_or_default()
    }

    /// Purpose line or, failing that, the payment reference.
    pub fn purpose(&self) -> &str {
        self.fields
            .verwendungszweck_zeile1
            .as_deref()
            .or(self.fields.zahlungsreferenz.as_deref())
            .unwrap_or_default()
    }
}

impl<'de> Deserialize<'de> for Transaction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Transaction::from_raw)
    }
}

impl Serialize for Transaction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_money_and_plain_amounts() {
        let json = r#"[
            {
                "id": 987,
                "buchungstag": "2026-02-03T00:00:00.000",
                "betrag": {"amount": -42.1, "currency": "EUR"},
                "transaktionsteilnehmerZeile1": "BILLA DANKT",
                "kategorieCode": "LEBENSMITTEL",
                "bookingInfo": {"foo": 1}
            },
            {"id": "abc", "betrag": 100.5, "verwendungszweckZeile1": "Gehalt"}
        ]"#;

        let txs: Vec<Transaction> = serde_json::from_str(json).unwrap();
        assert_eq!(txs[0].id(), Some("987"));
        assert_eq!(txs[0].booking_date(), "2026-02-03");
        assert_eq!(txs[0].description(), "BILLA DANKT");
        assert_eq!(txs[0].raw()["bookingInfo"], json!({"foo": 1}));

        assert_eq!(txs[1].amount(), Some(&Amount::Plain(100.5)));
        assert_eq!(txs[1].description(), "Gehalt");
        assert_eq!(txs[1].purpose(), "Gehalt");
    }

    #[test]
    fn odd_field_types_keep_the_rest_of_the_record() {
        let raw = json!({
            "id": 987,
            "buchungstag": "2026-02-03",
            "betrag": {"amount": "viel", "currency": "EUR"},
            "kategorieCode": 7,
            "iban": {"nested": true},
            "zahlungsreferenz": "RF18"
        });

        let tx = Transaction::from_raw(raw.clone());
        assert_eq!(tx.id(), Some("987"));
        assert_eq!(tx.amount(), None);
        assert_eq!(tx.purpose(), "RF18");

        let record = tx.csv_record();
        assert_eq!(record[1], "2026-02-03");
        assert_eq!(record[8], "7");
        assert_eq!(record[9], "");

        assert_eq!(serde_json::to_value(&tx).unwrap(), raw);
    }

    #[test]
    fn serializes_back_to_the_received_record() {
        let raw = json!({
            "id": 987,
            "betrag": {"amount": -5.0, "currency": "EUR", "precision": 2},
            "kategorieCode": 7
        });

        let tx: Transaction = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&tx).unwrap(), raw);
        assert_eq!(tx.amount().and_then(Amount::value), Some(-5.0));
    }

    #[test]
    fn non_object_record_has_no_fields() {
        let tx = Transaction::from_raw(json!("garbage"));
        assert_eq!(tx.id(), None);
        assert_eq!(tx.booking_date(), "");
        assert_eq!(tx.raw(), &json!("garbage"));
    }

    #[test]
    fn csv_record_follows_column_order() {
        let tx: Transaction = serde_json::from_str(
            r#"{
                "id": "1",
                "buchungstag": "2026-01-02",
                "valuta": "2026-01-03",
                "betrag": 12.5,
                "transaktionsteilnehmerZeile1": "Max",
                "verwendungszweckZeile1": "Miete",
                "iban": "AT01"
            }"#,
        )
        .unwrap();

        let record = tx.csv_record();
        assert_eq!(record.len(), TRANSACTION_CSV_COLUMNS.len());
        assert_eq!(record[0], "1");
        assert_eq!(record[3], "12.5");
        assert_eq!(record[4], "EUR");
        assert_eq!(record[5], "Max");
        assert_eq!(record[6], "Miete");
        assert_eq!(record[9], "AT01");
        assert_eq!(record[13], "");
    }
}
