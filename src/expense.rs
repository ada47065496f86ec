//! Expense records and the value types shared across the workflow.

use crate::error::ApprovalError;
use chrono::{DateTime, TimeZone, Utc};

/// Upper-case three-letter currency code, ISO-4217 style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Currency([u8; 3]);

impl Currency {
    pub fn parse(code: &str) -> Result<Self, ApprovalError> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_alphabetic()) {
            return Err(ApprovalError::Validation(format!(
                "invalid currency code: {code:?}"
            )));
        }
        let mut out = [0u8; 3];
        for (i, b) in bytes.iter().enumerate() {
            out[i] = b.to_ascii_uppercase();
        }
        Ok(Self(out))
    }
    pub fn as_str(&self) -> &str {
        // ascii by construction
        std::str::from_utf8(&self.0).expect("currency code is ascii")
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    #[n(0)]
    Food,
    #[n(1)]
    Travel,
    #[n(2)]
    Accommodation,
    #[n(3)]
    Transport,
    #[n(4)]
    Office,
    #[n(5)]
    Entertainment,
    #[n(6)]
    Other,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpenseStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Submitted,
    #[n(2)]
    PendingApproval,
    #[n(3)]
    Approved,
    #[n(4)]
    Rejected,
}

impl ExpenseStatus {
    /// Approved and Rejected admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, ExpenseStatus::Approved | ExpenseStatus::Rejected)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalAction {
    #[n(0)]
    Approved,
    #[n(1)]
    Rejected,
}

/// One recorded approver decision. History entries are append-only and
/// never mutated in place.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct ApprovalEntry {
    #[n(0)]
    pub approver: String,
    #[n(1)]
    pub action: ApprovalAction,
    #[n(2)]
    pub comment: String,
    #[n(3)]
    pub timestamp: TimeStamp<Utc>,
}

#[derive(Debug, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl<T: TimeZone> PartialEq for TimeStamp<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: TimeZone> Eq for TimeStamp<T> {}

impl<T: TimeZone> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a minor-unit amount into the company base currency, rounding
/// to the nearest minor unit.
pub fn to_base_amount(amount: u64, rate: f64) -> u64 {
    (amount as f64 * rate).round() as u64
}

/// The persisted expense record. `amount` and thresholds are minor units
/// (cents) of their respective currencies.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Expense {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub employee: String,
    #[n(2)]
    pub company: String,
    #[n(3)]
    pub description: String,
    #[n(4)]
    pub amount: u64,
    #[n(5)]
    pub currency: Currency,
    /// amount * exchange_rate, fixed at creation (recomputed only while
    /// the expense is still a draft being edited).
    #[n(6)]
    pub amount_in_base: u64,
    #[n(7)]
    pub exchange_rate: f64,
    /// Set when the rate lookup failed and 1 was used instead. Kept on the
    /// record so the availability-over-accuracy tradeoff is auditable.
    #[n(8)]
    pub rate_is_fallback: bool,
    #[n(9)]
    pub category: Category,
    #[n(10)]
    pub expense_date: TimeStamp<Utc>,
    #[n(11)]
    pub remarks: Option<String>,
    #[n(12)]
    pub status: ExpenseStatus,
    #[n(13)]
    pub approval_history: Vec<ApprovalEntry>,
    /// The single user whose pending action blocks progress, when any.
    #[n(14)]
    pub current_approver: Option<String>,
    /// Rule bound at creation time. The binding is permanent, even if the
    /// rule is later deactivated, so in-flight expenses stay consistent.
    #[n(15)]
    pub approval_rule: Option<String>,
}

impl Expense {
    pub fn push_history(&mut self, approver: &str, action: ApprovalAction, comment: String) {
        self.approval_history.push(ApprovalEntry {
            approver: approver.to_string(),
            action,
            comment,
            timestamp: TimeStamp::new(),
        });
    }
}

/// Validated field set produced by [`ExpenseDraft::validate`].
#[derive(Debug, Clone)]
pub struct ExpenseFields {
    pub description: String,
    pub amount: u64,
    pub currency: Currency,
    pub category: Category,
    pub expense_date: TimeStamp<Utc>,
    pub remarks: Option<String>,
}

// Also used for draft edits; a draft always carries the full field set.
#[derive(Debug, Default, Clone)]
pub struct ExpenseDraft {
    description: Option<String>,
    amount: u64,
    currency: Option<Currency>,
    category: Option<Category>,
    expense_date: Option<TimeStamp<Utc>>,
    remarks: Option<String>,
}

impl ExpenseDraft {
    /// Construct a new builder object, the basis for a draft expense.
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.trim().to_string());
        self
    }
    /// Amount in minor units of the submitted currency.
    pub fn set_amount(mut self, amount: u64) -> Self {
        self.amount = amount;
        self
    }
    pub fn set_currency(mut self, currency: Currency) -> Self {
        self.currency = Some(currency);
        self
    }
    pub fn set_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }
    pub fn set_expense_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.expense_date = Some(date);
        self
    }
    pub fn set_remarks(mut self, remarks: &str) -> Self {
        self.remarks = Some(remarks.trim().to_string());
        self
    }

    /// Checks fields and performs validation, returning the validated
    /// field set on success.
    pub fn validate(self) -> Result<ExpenseFields, ApprovalError> {
        let description = match self.description {
            Some(d) if (5..=500).contains(&d.chars().count()) => d,
            Some(_) => {
                return Err(ApprovalError::Validation(
                    "description must be 5 to 500 characters".into(),
                ));
            }
            None => return Err(ApprovalError::Validation("description is required".into())),
        };
        if self.amount == 0 {
            return Err(ApprovalError::Validation("amount must be positive".into()));
        }
        let currency = self
            .currency
            .ok_or_else(|| ApprovalError::Validation("currency is required".into()))?;
        let category = self
            .category
            .ok_or_else(|| ApprovalError::Validation("category is required".into()))?;
        let expense_date = self
            .expense_date
            .ok_or_else(|| ApprovalError::Validation("expense date is required".into()))?;
        if expense_date.to_datetime_utc() > Utc::now() {
            return Err(ApprovalError::Validation(
                "expense date cannot be in the future".into(),
            ));
        }
        if let Some(remarks) = &self.remarks {
            if remarks.chars().count() > 1000 {
                return Err(ApprovalError::Validation(
                    "remarks cannot exceed 1000 characters".into(),
                ));
            }
        }

        Ok(ExpenseFields {
            description,
            amount: self.amount,
            currency,
            category,
            expense_date,
            remarks: self.remarks,
        })
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}
impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}
impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl<C> minicbor::Encode<C> for Currency {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(self.as_str())?.ok()
    }
}
impl<'b, C> minicbor::Decode<'b, C> for Currency {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let code = d.str()?;

        Currency::parse(code)
            .map_err(|_| minicbor::decode::Error::message("invalid currency code"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn currency_parse_uppercases() {
        let c = Currency::parse("usd").unwrap();
        assert_eq!(c.as_str(), "USD");
    }

    #[test]
    fn currency_rejects_bad_codes() {
        assert!(Currency::parse("").is_err());
        assert!(Currency::parse("US").is_err());
        assert!(Currency::parse("USDC").is_err());
        assert!(Currency::parse("U5D").is_err());
    }

    #[test]
    fn currency_encoding() {
        let original = Currency::parse("EUR").unwrap();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: Currency = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn draft_validation_requires_all_fields() {
        let draft = ExpenseDraft::new()
            .set_description("team lunch with client")
            .set_amount(4_500);

        assert!(draft.validate().is_err());
    }

    #[test]
    fn draft_validation_rejects_future_dates() {
        let tomorrow = Utc::now() + chrono::Duration::days(1);

        let draft = ExpenseDraft::new()
            .set_description("team lunch with client")
            .set_amount(4_500)
            .set_currency(Currency::parse("USD").unwrap())
            .set_category(Category::Food)
            .set_expense_date(tomorrow.into());

        assert!(draft.validate().is_err());
    }

    #[test]
    fn base_amount_rounds_to_nearest_minor_unit() {
        assert_eq!(to_base_amount(1_000, 1.0), 1_000);
        assert_eq!(to_base_amount(1_000, 0.915), 915);
        assert_eq!(to_base_amount(333, 0.5), 167);
    }
}
