//! Domain models for Tally

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Recognized statement field names
pub mod fields {
    pub const DATE: &str = "Date";
    pub const AMOUNT: &str = "Amount";
    pub const PAYEE: &str = "Payee";
    pub const MEMO: &str = "Memo";
    pub const TRAN_TYPE: &str = "Tran Type";
    pub const UNIQUE_ID: &str = "Unique Id";
    pub const CATEGORY: &str = "Category";
    pub const TRANSFERS: &str = "Transfers";
    pub const PREDICTED_CATEGORY: &str = "Predicted Category";
    pub const PROBABILITY: &str = "Probability";
}

/// Columns every row must carry before it can be categorized
pub const REQUIRED_COLUMNS: [&str; 3] = [fields::PAYEE, fields::MEMO, fields::TRAN_TYPE];

/// A transaction row as read from a statement or ledger
///
/// Field order follows the source table's column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transaction {
    fields: IndexMap<String, String>,
}

impl Transaction {
    /// Build from (field, value) pairs, keeping their order
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Set a field, appending it if new and overwriting in place otherwise
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn date(&self) -> Option<&str> {
        self.get(fields::DATE)
    }

    pub fn amount(&self) -> Option<&str> {
        self.get(fields::AMOUNT)
    }

    pub fn payee(&self) -> Option<&str> {
        self.get(fields::PAYEE)
    }

    pub fn memo(&self) -> Option<&str> {
        self.get(fields::MEMO)
    }

    pub fn tran_type(&self) -> Option<&str> {
        self.get(fields::TRAN_TYPE)
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.get(fields::UNIQUE_ID)
    }

    /// Required columns this row does not carry
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|col| !self.contains(col))
            .map(|col| col.to_string())
            .collect()
    }
}

/// Strip thousands separators so "1,234.50" and "1234.50" compare equal
pub fn normalize_amount(amount: &str) -> String {
    amount.replace(',', "")
}

/// Ledger columns that can carry a category, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryColumn {
    Category,
    Transfers,
}

impl CategoryColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => fields::CATEGORY,
            Self::Transfers => fields::TRANSFERS,
        }
    }

    /// All accepted columns, highest priority first
    pub fn all() -> &'static [CategoryColumn] {
        &[Self::Category, Self::Transfers]
    }
}

impl std::fmt::Display for CategoryColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Banks with a supported statement layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bank {
    Asb,
}

impl Bank {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asb => "asb",
        }
    }
}

impl std::str::FromStr for Bank {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asb" => Ok(Self::Asb),
            _ => Err(format!("Unsupported bank: {}", s)),
        }
    }
}

impl std::fmt::Display for Bank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

/// Position of a row within its batch
///
/// Carried through embedding and classification so results are joined back
/// by identity instead of by whatever order a stage happens to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub usize);

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}", self.0)
    }
}

/// How a transaction got its category
#[derive(Debug, Clone, PartialEq)]
pub enum Categorization {
    /// Predicted by the classifier
    Predicted { category: String, probability: f32 },
    /// Copied from a matching ledger row; empty when nothing matched
    Reconciled { category: String },
}

impl Categorization {
    pub fn category(&self) -> &str {
        match self {
            Self::Predicted { category, .. } | Self::Reconciled { category } => category,
        }
    }

    pub fn probability(&self) -> Option<f32> {
        match self {
            Self::Predicted { probability, .. } => Some(*probability),
            Self::Reconciled { .. } => None,
        }
    }
}

/// A transaction with its category attached
#[derive(Debug, Clone, PartialEq)]
pub struct CategorizedTransaction {
    pub transaction: Transaction,
    pub categorization: Categorization,
}

impl CategorizedTransaction {
    pub fn predicted(transaction: Transaction, category: String, probability: f32) -> Self {
        Self {
            transaction,
            categorization: Categorization::Predicted {
                category,
                probability,
            },
        }
    }

    pub fn reconciled(transaction: Transaction, category: String) -> Self {
        Self {
            transaction,
            categorization: Categorization::Reconciled { category },
        }
    }

    pub fn category(&self) -> &str {
        self.categorization.category()
    }

    pub fn probability(&self) -> Option<f32> {
        self.categorization.probability()
    }
}

impl Serialize for CategorizedTransaction {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;
        for (key, value) in self.transaction.fields() {
            // Overwritten below; emitting twice would produce duplicate keys
            if self.overrides(key) {
                continue;
            }
            map.serialize_entry(key, value)?;
        }
        match &self.categorization {
            Categorization::Predicted {
                category,
                probability,
            } => {
                map.serialize_entry(fields::PREDICTED_CATEGORY, category)?;
                map.serialize_entry(fields::PROBABILITY, probability)?;
            }
            Categorization::Reconciled { category } => {
                map.serialize_entry(fields::CATEGORY, category)?;
            }
        }
        map.end()
    }
}

impl CategorizedTransaction {
    fn overrides(&self, key: &str) -> bool {
        match self.categorization {
            Categorization::Predicted { .. } => {
                key == fields::PREDICTED_CATEGORY || key == fields::PROBABILITY
            }
            Categorization::Reconciled { .. } => key == fields::CATEGORY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction::from_pairs([
            ("Date", "01/02/24"),
            ("Unique Id", "2024010201"),
            ("Tran Type", "EFTPOS"),
            ("Payee", "COUNTDOWN"),
            ("Memo", "4835-****-****-1234"),
            ("Amount", "-45.20"),
        ])
    }

    #[test]
    fn test_normalize_amount() {
        assert_eq!(normalize_amount("1,234.50"), "1234.50");
        assert_eq!(normalize_amount("1234.50"), "1234.50");
        assert_eq!(normalize_amount("-1,000,000"), "-1000000");
    }

    #[test]
    fn test_transaction_accessors() {
        let tx = sample();
        assert_eq!(tx.date(), Some("01/02/24"));
        assert_eq!(tx.payee(), Some("COUNTDOWN"));
        assert_eq!(tx.unique_id(), Some("2024010201"));
        assert_eq!(tx.len(), 6);
    }

    #[test]
    fn test_missing_columns() {
        let tx = Transaction::from_pairs([("Payee", "X"), ("Amount", "1")]);
        assert_eq!(
            tx.missing_columns(&REQUIRED_COLUMNS),
            vec!["Memo".to_string(), "Tran Type".to_string()]
        );
        assert!(sample().missing_columns(&REQUIRED_COLUMNS).is_empty());
    }

    #[test]
    fn test_set_keeps_column_position() {
        let mut tx = sample();
        tx.set("Payee", "NEW WORLD");
        let keys: Vec<_> = tx.keys().collect();
        assert_eq!(keys[3], "Payee");
        tx.set("Category", "Groceries");
        assert_eq!(tx.keys().last(), Some("Category"));
    }

    #[test]
    fn test_bank_from_str() {
        assert_eq!("ASB".parse::<Bank>().unwrap(), Bank::Asb);
        assert_eq!("asb".parse::<Bank>().unwrap(), Bank::Asb);
        assert!("kiwibank".parse::<Bank>().is_err());
        assert_eq!(Bank::Asb.to_string(), "ASB");
    }

    #[test]
    fn test_category_column_priority() {
        assert_eq!(
            CategoryColumn::all(),
            &[CategoryColumn::Category, CategoryColumn::Transfers]
        );
    }

    #[test]
    fn test_predicted_serialization() {
        let categorized =
            CategorizedTransaction::predicted(sample(), "Groceries".to_string(), 0.75);
        let json = serde_json::to_value(&categorized).unwrap();
        assert_eq!(json["Payee"], "COUNTDOWN");
        assert_eq!(json["Predicted Category"], "Groceries");
        assert_eq!(json["Probability"], 0.75);
        assert!(json.get("Category").is_none());
    }

    #[test]
    fn test_reconciled_serialization_overwrites_category() {
        let mut tx = sample();
        tx.set("Category", "stale");
        let categorized = CategorizedTransaction::reconciled(tx, String::new());
        let json = serde_json::to_string(&categorized).unwrap();
        assert_eq!(json.matches("\"Category\"").count(), 1);
        assert!(json.contains("\"Category\":\"\""));
        assert!(categorized.probability().is_none());
    }
}
