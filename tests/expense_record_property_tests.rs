//! Property-based tests for expense records
//!
//! These tests cover the persistence-critical pieces of the expense
//! record: CBOR round-trips (a decode that disagrees with its encode
//! corrupts the store), history append semantics, and the currency
//! conversion arithmetic.

use expense_approval::expense::{
    to_base_amount, ApprovalAction, ApprovalEntry, Category, Currency, Expense, ExpenseDraft,
    ExpenseStatus, TimeStamp,
};
use proptest::prelude::*;

// PROPERTY TEST STRATEGIES

fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![Just("USD"), Just("EUR"), Just("GBP"), Just("JPY")]
        .prop_map(|code| Currency::parse(code).unwrap())
}

fn category_strategy() -> impl Strategy<Value = Category> {
    prop_oneof![
        Just(Category::Food),
        Just(Category::Travel),
        Just(Category::Accommodation),
        Just(Category::Transport),
        Just(Category::Office),
        Just(Category::Entertainment),
        Just(Category::Other),
    ]
}

fn status_strategy() -> impl Strategy<Value = ExpenseStatus> {
    prop_oneof![
        Just(ExpenseStatus::Draft),
        Just(ExpenseStatus::Submitted),
        Just(ExpenseStatus::PendingApproval),
        Just(ExpenseStatus::Approved),
        Just(ExpenseStatus::Rejected),
    ]
}

fn action_strategy() -> impl Strategy<Value = ApprovalAction> {
    prop::bool::ANY.prop_map(|b| {
        if b {
            ApprovalAction::Approved
        } else {
            ApprovalAction::Rejected
        }
    })
}

fn timestamp_strategy() -> impl Strategy<Value = TimeStamp<chrono::Utc>> {
    (2020i32..=2025, 1u32..=12, 1u32..=28).prop_map(|(year, month, day)| {
        TimeStamp::new_with(year, month, day, 12, 0, 0)
    })
}

fn history_entry_strategy() -> impl Strategy<Value = ApprovalEntry> {
    (any::<u32>(), action_strategy(), "[a-z ]{0,40}", timestamp_strategy()).prop_map(
        |(approver, action, comment, timestamp)| ApprovalEntry {
            approver: format!("user_{approver}"),
            action,
            comment,
            timestamp,
        },
    )
}

/// Amounts stay well inside f64's exact-integer range so conversion
/// arithmetic never loses minor units to representation error.
fn amount_strategy() -> impl Strategy<Value = u64> {
    1u64..=1_000_000_000_000
}

/// Strategy to generate a fully populated expense record
fn expense_strategy() -> impl Strategy<Value = Expense> {
    (
        (any::<u32>(), any::<u32>(), any::<u32>()),
        "[a-z ]{5,60}",
        amount_strategy(),
        currency_strategy(),
        (0.01f64..=100.0, prop::bool::ANY),
        category_strategy(),
        timestamp_strategy(),
        prop::option::of("[a-z ]{0,80}"),
        status_strategy(),
        prop::collection::vec(history_entry_strategy(), 0..=4),
    )
        .prop_map(
            |(
                (id, employee, company),
                description,
                amount,
                currency,
                (exchange_rate, rate_is_fallback),
                category,
                expense_date,
                remarks,
                status,
                approval_history,
            )| {
                let amount_in_base = to_base_amount(amount, exchange_rate);
                Expense {
                    id: format!("expense_{id}"),
                    employee: format!("user_{employee}"),
                    company: format!("company_{company}"),
                    description,
                    amount,
                    currency,
                    amount_in_base,
                    exchange_rate,
                    rate_is_fallback,
                    category,
                    expense_date,
                    remarks,
                    status,
                    approval_history,
                    current_approver: None,
                    approval_rule: None,
                }
            },
        )
}

// PROPERTY TESTS
proptest! {
    /// Property: CBOR round-trip preserves the whole record
    ///
    /// Encoding then decoding an expense must reproduce it exactly,
    /// including the f64 exchange rate, the full approval history, and
    /// every optional field. Anything less silently corrupts the store.
    #[test]
    fn prop_cbor_roundtrip_preserves_record(expense in expense_strategy()) {
        let encoded = minicbor::to_vec(&expense).expect("encoding should succeed");
        let decoded: Expense = minicbor::decode(&encoded).expect("decoding should succeed");

        prop_assert_eq!(expense, decoded);
    }

    /// Property: history is append-only
    ///
    /// Recording a decision grows the history by exactly one entry,
    /// leaves every earlier entry untouched, and puts the new decision at
    /// the tail.
    #[test]
    fn prop_push_history_appends_without_rewriting(
        mut expense in expense_strategy(),
        approver in any::<u32>(),
        action in action_strategy(),
        comment in "[a-z ]{5,40}",
    ) {
        let before = expense.approval_history.clone();
        let approver = format!("user_{approver}");

        expense.push_history(&approver, action, comment.clone());

        prop_assert_eq!(expense.approval_history.len(), before.len() + 1);
        prop_assert_eq!(&expense.approval_history[..before.len()], &before[..]);

        let tail = expense.approval_history.last().unwrap();
        prop_assert_eq!(&tail.approver, &approver);
        prop_assert_eq!(tail.action, action);
        prop_assert_eq!(&tail.comment, &comment);
    }

    /// Property: a rate of exactly 1 is the identity conversion
    #[test]
    fn prop_unit_rate_is_identity(amount in amount_strategy()) {
        prop_assert_eq!(to_base_amount(amount, 1.0), amount);
    }

    /// Property: conversion is monotone in the amount
    ///
    /// For any fixed positive rate, a larger submitted amount never
    /// converts to a smaller base amount. Rounding may collapse
    /// neighbours but must never invert them.
    #[test]
    fn prop_conversion_is_monotone_in_amount(
        a in amount_strategy(),
        b in amount_strategy(),
        rate in 0.01f64..=100.0,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(to_base_amount(lo, rate) <= to_base_amount(hi, rate));
    }

    /// Property: well-formed drafts always validate
    ///
    /// Any draft whose fields sit inside the documented bounds passes
    /// validation and comes back field for field unchanged (modulo
    /// trimming, which the generated values never need).
    #[test]
    fn prop_well_formed_drafts_validate(
        description in "[a-z][a-z ]{4,120}[a-z]",
        amount in amount_strategy(),
        currency in currency_strategy(),
        category in category_strategy(),
        expense_date in timestamp_strategy(),
    ) {
        let draft = ExpenseDraft::new()
            .set_description(&description)
            .set_amount(amount)
            .set_currency(currency.clone())
            .set_category(category)
            .set_expense_date(expense_date.clone());

        let fields = draft.validate();
        prop_assert!(fields.is_ok(), "draft should validate: {:?}", fields.err());

        let fields = fields.unwrap();
        prop_assert_eq!(fields.description, description);
        prop_assert_eq!(fields.amount, amount);
        prop_assert_eq!(fields.currency, currency);
        prop_assert_eq!(fields.category, category);
        prop_assert_eq!(fields.expense_date, expense_date);
    }
}

// ADDITIONAL PROPTEST EXAMPLES WITH EXPLICIT CONFIGURATION

#[cfg(test)]
mod extensive_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1000))]

        /// Property: encoding is deterministic
        ///
        /// The same record must encode to the same bytes every time.
        /// Optimistic concurrency compares raw stored bytes, so a
        /// non-deterministic encoder would make every writer look like a
        /// conflicting one.
        #[test]
        fn prop_encoding_is_deterministic(expense in expense_strategy()) {
            let first = minicbor::to_vec(&expense).unwrap();
            let second = minicbor::to_vec(&expense).unwrap();
            let third = minicbor::to_vec(&expense).unwrap();

            prop_assert_eq!(&first, &second);
            prop_assert_eq!(&second, &third);
        }
    }
}
