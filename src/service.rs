//! Service layer API for expense workflow operations.
//!
//! Every operation takes the acting user's id explicitly, loads the
//! record, and enforces role/ownership itself -- there is no ambient
//! request context. Lookups are always scoped to the acting user's
//! company; cross-tenant references read as not-found.

use crate::company::{Company, CompanySettings};
use crate::error::{ApprovalError, Result};
use crate::expense::{
    to_base_amount, ApprovalAction, Currency, Expense, ExpenseDraft, ExpenseStatus, TimeStamp,
};
use crate::rates::RateProvider;
use crate::rule::{self, ApprovalRule, Classification, NewRule};
use crate::store::EntityStore;
use crate::user::{self, NewUser, Role, User, UserUpdate};
use crate::utils;
use sled::IVec;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ExpenseService<R: RateProvider> {
    store: EntityStore,
    rates: R,
}

impl<R: RateProvider> ExpenseService<R> {
    pub fn new(instance: Arc<sled::Db>, rates: R) -> Result<Self> {
        Ok(Self {
            store: EntityStore::open(instance)?,
            rates,
        })
    }

    // --- tenant and user administration ---

    /// Signup path: creates the company and its first admin in one step.
    pub fn register_company(
        &self,
        name: &str,
        country: &str,
        base_currency: Currency,
        currency_symbol: &str,
        admin_name: &str,
        admin_email: &str,
    ) -> Result<(Company, User)> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > 100 {
            return Err(ApprovalError::Validation(
                "company name must be 1 to 100 characters".into(),
            ));
        }
        if country.trim().is_empty() {
            return Err(ApprovalError::Validation("country is required".into()));
        }
        if currency_symbol.is_empty() || currency_symbol.chars().count() > 5 {
            return Err(ApprovalError::Validation(
                "currency symbol must be 1 to 5 characters".into(),
            ));
        }
        user::validate_name(admin_name)?;
        user::validate_email(admin_email)?;

        let company = Company {
            id: utils::fresh_id("company_"),
            name: name.to_string(),
            country: country.trim().to_string(),
            base_currency,
            currency_symbol: currency_symbol.to_string(),
            is_active: true,
            settings: CompanySettings::default(),
        };
        let admin = User {
            id: utils::fresh_id("user_"),
            company: company.id.clone(),
            name: admin_name.trim().to_string(),
            email: admin_email.trim().to_string(),
            role: Role::Admin,
            manager: None,
            is_active: true,
        };

        self.store.put_company(&company)?;
        self.store.put_user(&admin)?;

        Ok((company, admin))
    }

    pub fn create_user(&self, admin_id: &str, new: NewUser) -> Result<User> {
        let admin = self.require_admin(admin_id)?;
        new.validate()?;
        if let Some(manager_id) = &new.manager {
            self.check_manager(&admin.company, manager_id, None)?;
        }

        let user = User {
            id: utils::fresh_id("user_"),
            company: admin.company,
            name: new.name.trim().to_string(),
            email: new.email.trim().to_string(),
            role: new.role,
            manager: new.manager,
            is_active: true,
        };
        self.store.put_user(&user)?;
        Ok(user)
    }

    pub fn update_user(&self, admin_id: &str, user_id: &str, update: UserUpdate) -> Result<User> {
        let admin = self.require_admin(admin_id)?;
        let mut user = self
            .store
            .get_user(user_id)?
            .filter(|u| u.company == admin.company)
            .ok_or(ApprovalError::NotFound("user"))?;

        if let Some(name) = update.name {
            user::validate_name(&name)?;
            user.name = name.trim().to_string();
        }
        if let Some(email) = update.email {
            user::validate_email(&email)?;
            user.email = email.trim().to_string();
        }
        if let Some(role) = update.role {
            if user.id == admin.id {
                return Err(ApprovalError::Validation(
                    "cannot change your own role".into(),
                ));
            }
            user.role = role;
        }
        if let Some(manager_change) = update.manager {
            match manager_change {
                Some(manager_id) => {
                    self.check_manager(&admin.company, &manager_id, Some(&user.id))?;
                    user.manager = Some(manager_id);
                }
                None => user.manager = None,
            }
        }
        if let Some(is_active) = update.is_active {
            user.is_active = is_active;
        }

        self.store.put_user(&user)?;
        Ok(user)
    }

    /// Active admins and managers of the acting user's company, the pool a
    /// rule author may pick approvers from.
    pub fn list_applicable_approvers(&self, acting_id: &str) -> Result<Vec<User>> {
        let acting = self.load_active_user(acting_id)?;
        if !acting.role.can_approve() {
            return Err(ApprovalError::Unauthorized(
                "only admins and managers may list approvers".into(),
            ));
        }

        let mut approvers: Vec<User> = self
            .store
            .users_in_company(&acting.company)?
            .into_iter()
            .filter(|u| u.is_active && u.role.can_approve())
            .collect();
        approvers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(approvers)
    }

    // --- rule authoring ---

    pub fn create_rule(&self, admin_id: &str, draft: NewRule) -> Result<ApprovalRule> {
        let admin = self.require_admin(admin_id)?;
        draft.validate()?;
        self.check_approver_refs(
            &admin.company,
            draft.flow.approvers.iter().map(|slot| slot.user.as_str()),
        )?;
        self.check_approver_refs(
            &admin.company,
            draft.escalation.escalation_approvers.iter().map(String::as_str),
        )?;

        let rule = ApprovalRule {
            id: utils::fresh_id("rule_"),
            company: admin.company,
            name: draft.name.trim().to_string(),
            description: draft.description,
            is_active: true,
            created_at: TimeStamp::new(),
            conditions: draft.conditions,
            flow: draft.flow,
            escalation: draft.escalation,
        };
        self.store.put_rule(&rule)?;
        debug!(rule = %rule.id, threshold = rule.conditions.amount_threshold, "approval rule created");
        Ok(rule)
    }

    pub fn update_rule(&self, admin_id: &str, rule_id: &str, draft: NewRule) -> Result<ApprovalRule> {
        let admin = self.require_admin(admin_id)?;
        let existing = self
            .store
            .get_rule(rule_id)?
            .filter(|r| r.company == admin.company)
            .ok_or(ApprovalError::NotFound("approval rule"))?;

        draft.validate()?;
        self.check_approver_refs(
            &admin.company,
            draft.flow.approvers.iter().map(|slot| slot.user.as_str()),
        )?;
        self.check_approver_refs(
            &admin.company,
            draft.escalation.escalation_approvers.iter().map(String::as_str),
        )?;

        let rule = ApprovalRule {
            name: draft.name.trim().to_string(),
            description: draft.description,
            conditions: draft.conditions,
            flow: draft.flow,
            escalation: draft.escalation,
            ..existing
        };
        self.store.put_rule(&rule)?;
        Ok(rule)
    }

    /// Soft delete: expenses already bound to the rule keep resolving
    /// against it, it just stops matching new expenses.
    pub fn deactivate_rule(&self, admin_id: &str, rule_id: &str) -> Result<ApprovalRule> {
        let admin = self.require_admin(admin_id)?;
        let mut rule = self
            .store
            .get_rule(rule_id)?
            .filter(|r| r.company == admin.company)
            .ok_or(ApprovalError::NotFound("approval rule"))?;

        rule.is_active = false;
        self.store.put_rule(&rule)?;
        Ok(rule)
    }

    // --- expense lifecycle ---

    /// Create a draft expense: convert into the base currency, pick the
    /// governing rule, and bind it permanently.
    pub fn create_expense(&self, employee_id: &str, draft: ExpenseDraft) -> Result<Expense> {
        let employee = self.load_active_user(employee_id)?;
        if employee.role != Role::Employee {
            return Err(ApprovalError::Unauthorized(
                "only employees file expenses".into(),
            ));
        }
        let fields = draft.validate()?;
        let company = self
            .store
            .get_company(&employee.company)?
            .ok_or(ApprovalError::NotFound("company"))?;

        let (exchange_rate, rate_is_fallback) =
            self.convert_rate(&fields.currency, &company.base_currency);
        let amount_in_base = to_base_amount(fields.amount, exchange_rate);

        let classification = Classification {
            amount_in_base,
            category: fields.category,
        };
        let rules = self.store.active_rules_for_company(&company.id)?;
        let selected = rule::select_rule(&rules, &classification);

        let (approval_rule, current_approver) = match selected {
            Some(rule) => {
                debug!(rule = %rule.id, amount_in_base, "bound approval rule to expense");
                (Some(rule.id.clone()), rule.next_approver(None)?)
            }
            None => (None, None),
        };

        let expense = Expense {
            id: utils::fresh_id("expense_"),
            employee: employee.id,
            company: company.id,
            description: fields.description,
            amount: fields.amount,
            currency: fields.currency,
            amount_in_base,
            exchange_rate,
            rate_is_fallback,
            category: fields.category,
            expense_date: fields.expense_date,
            remarks: fields.remarks,
            status: ExpenseStatus::Draft,
            approval_history: vec![],
            current_approver,
            approval_rule,
        };
        self.store.insert_expense(&expense)?;
        Ok(expense)
    }

    /// Edit a draft in place. Amount or currency changes recompute the
    /// exchange rate and base amount; the rule binding is permanent and
    /// is not revisited.
    pub fn update_expense(
        &self,
        expense_id: &str,
        employee_id: &str,
        draft: ExpenseDraft,
    ) -> Result<Expense> {
        let employee = self.load_active_user(employee_id)?;
        let (mut expense, witnessed) = self.load_scoped(expense_id, &employee.company)?;
        if expense.employee != employee.id {
            return Err(ApprovalError::Unauthorized(
                "only the owner may edit an expense".into(),
            ));
        }
        if expense.status != ExpenseStatus::Draft {
            return Err(ApprovalError::InvalidState(
                "only draft expenses can be edited".into(),
            ));
        }

        let fields = draft.validate()?;
        let company = self
            .store
            .get_company(&expense.company)?
            .ok_or(ApprovalError::NotFound("company"))?;
        let (exchange_rate, rate_is_fallback) =
            self.convert_rate(&fields.currency, &company.base_currency);

        expense.description = fields.description;
        expense.amount = fields.amount;
        expense.currency = fields.currency;
        expense.exchange_rate = exchange_rate;
        expense.rate_is_fallback = rate_is_fallback;
        expense.amount_in_base = to_base_amount(fields.amount, exchange_rate);
        expense.category = fields.category;
        expense.expense_date = fields.expense_date;
        expense.remarks = fields.remarks;

        self.store.swap_expense(&expense, &witnessed)?;
        Ok(expense)
    }

    /// Submit a draft for approval. With a bound rule and a resolvable
    /// first approver the expense moves straight to pending approval;
    /// with no approver required it stays submitted.
    pub fn submit_expense(&self, expense_id: &str, acting_id: &str) -> Result<Expense> {
        let acting = self.load_active_user(acting_id)?;
        let (mut expense, witnessed) = self.load_scoped(expense_id, &acting.company)?;
        if expense.employee != acting.id {
            return Err(ApprovalError::Unauthorized(
                "only the owner may submit an expense".into(),
            ));
        }
        if expense.status != ExpenseStatus::Draft {
            return Err(ApprovalError::InvalidState(format!(
                "expense cannot be submitted from {:?}",
                expense.status
            )));
        }

        expense.status = ExpenseStatus::Submitted;
        expense.current_approver = None;
        if let Some(rule_id) = &expense.approval_rule {
            if let Some(rule) = self.store.get_rule(rule_id)? {
                expense.current_approver = rule.next_approver(None)?;
                if expense.current_approver.is_some() {
                    expense.status = ExpenseStatus::PendingApproval;
                }
            }
        }

        debug!(expense = %expense.id, status = ?expense.status, "expense submitted");
        self.store.swap_expense(&expense, &witnessed)?;
        Ok(expense)
    }

    pub fn approve_expense(
        &self,
        expense_id: &str,
        acting_id: &str,
        comment: Option<&str>,
    ) -> Result<Expense> {
        if let Some(comment) = comment {
            validate_comment(comment)?;
        }
        self.decide(expense_id, acting_id, ApprovalAction::Approved, comment)
    }

    /// Rejection requires a substantive comment; approval does not.
    pub fn reject_expense(&self, expense_id: &str, acting_id: &str, comment: &str) -> Result<Expense> {
        validate_comment(comment)?;
        if comment.trim().chars().count() < 5 {
            return Err(ApprovalError::Validation(
                "rejection comment must be at least 5 characters".into(),
            ));
        }
        self.decide(expense_id, acting_id, ApprovalAction::Rejected, Some(comment))
    }

    pub fn get_expense(&self, expense_id: &str, acting_id: &str) -> Result<Expense> {
        let acting = self.load_active_user(acting_id)?;
        let (expense, _) = self.load_scoped(expense_id, &acting.company)?;
        if acting.role == Role::Employee && expense.employee != acting.id {
            return Err(ApprovalError::Unauthorized("access denied".into()));
        }
        Ok(expense)
    }

    /// Role-scoped listing: employees see their own expenses, managers
    /// additionally see their direct reports' and anything awaiting their
    /// approval, admins see the whole company.
    pub fn list_expenses(
        &self,
        acting_id: &str,
        status: Option<ExpenseStatus>,
    ) -> Result<Vec<Expense>> {
        let acting = self.load_active_user(acting_id)?;
        let all = self.store.expenses_for_company(&acting.company)?;

        let mut visible: Vec<Expense> = match acting.role {
            Role::Admin => all,
            Role::Employee => all
                .into_iter()
                .filter(|e| e.employee == acting.id)
                .collect(),
            Role::Manager => {
                let reports: Vec<String> = self
                    .store
                    .users_in_company(&acting.company)?
                    .into_iter()
                    .filter(|u| u.manager.as_deref() == Some(acting.id.as_str()))
                    .map(|u| u.id)
                    .collect();
                all.into_iter()
                    .filter(|e| {
                        e.employee == acting.id
                            || reports.contains(&e.employee)
                            || e.current_approver.as_deref() == Some(acting.id.as_str())
                    })
                    .collect()
            }
        };
        if let Some(status) = status {
            visible.retain(|e| e.status == status);
        }
        // newest first; ids share the expense_date ordering closely enough
        // that the date alone is a stable display order
        visible.sort_by(|a, b| b.expense_date.cmp(&a.expense_date).then_with(|| b.id.cmp(&a.id)));
        Ok(visible)
    }

    // --- internals ---

    fn load_active_user(&self, id: &str) -> Result<User> {
        self.store
            .get_user(id)?
            .filter(|u| u.is_active)
            .ok_or(ApprovalError::NotFound("user"))
    }

    fn require_admin(&self, id: &str) -> Result<User> {
        let user = self.load_active_user(id)?;
        if user.role != Role::Admin {
            return Err(ApprovalError::Unauthorized(
                "administrator role required".into(),
            ));
        }
        Ok(user)
    }

    fn load_scoped(&self, expense_id: &str, company: &str) -> Result<(Expense, IVec)> {
        self.store
            .get_expense_raw(expense_id)?
            .filter(|(e, _)| e.company == company)
            .ok_or(ApprovalError::NotFound("expense"))
    }

    /// Same-currency conversions short-circuit to 1. A failed or
    /// non-positive lookup also yields 1, but flagged and logged -- the
    /// expense is created anyway, trading accuracy for availability.
    fn convert_rate(&self, from: &Currency, to: &Currency) -> (f64, bool) {
        if from == to {
            return (1.0, false);
        }
        match self.rates.rate(from, to) {
            Ok(rate) if rate > 0.0 => (rate, false),
            Ok(rate) => {
                warn!(%from, %to, rate, "non-positive exchange rate, falling back to 1");
                (1.0, true)
            }
            Err(error) => {
                warn!(%from, %to, %error, "exchange rate lookup failed, falling back to 1");
                (1.0, true)
            }
        }
    }

    /// Verify every referenced approver is an active admin or manager of
    /// the same company.
    fn check_approver_refs<'a>(
        &self,
        company: &str,
        ids: impl Iterator<Item = &'a str>,
    ) -> Result<()> {
        for id in ids {
            let eligible = self
                .store
                .get_user(id)?
                .map(|u| u.company == company && u.is_active && u.role.can_approve())
                .unwrap_or(false);
            if !eligible {
                return Err(ApprovalError::Validation(format!(
                    "approver {id} not found or not eligible"
                )));
            }
        }
        Ok(())
    }

    /// The prospective manager must be an active admin/manager of the
    /// company, and assigning them must not close a reporting cycle. The
    /// walk is bounded by the company's user count, so a pre-existing
    /// malformed chain cannot loop forever.
    fn check_manager(&self, company: &str, manager_id: &str, report_id: Option<&str>) -> Result<()> {
        let eligible = self
            .store
            .get_user(manager_id)?
            .map(|u| u.company == company && u.is_active && u.role.can_approve())
            .unwrap_or(false);
        if !eligible {
            return Err(ApprovalError::Validation(
                "manager must be an active admin or manager of the company".into(),
            ));
        }

        if let Some(report) = report_id {
            let bound = self.store.users_in_company(company)?.len();
            let mut cursor = Some(manager_id.to_string());
            for _ in 0..=bound {
                let Some(current) = cursor else {
                    return Ok(());
                };
                if current == report {
                    return Err(ApprovalError::Validation(
                        "manager assignment would create a reporting cycle".into(),
                    ));
                }
                cursor = self.store.get_user(&current)?.and_then(|u| u.manager);
            }
            return Err(ApprovalError::Validation(
                "manager chain exceeds company size".into(),
            ));
        }
        Ok(())
    }

    /// Shared approve/reject path. Guards status and approver identity,
    /// appends to history, and advances or terminates the chain.
    fn decide(
        &self,
        expense_id: &str,
        acting_id: &str,
        action: ApprovalAction,
        comment: Option<&str>,
    ) -> Result<Expense> {
        let acting = self.load_active_user(acting_id)?;
        if !acting.role.can_approve() {
            return Err(ApprovalError::Unauthorized(
                "approver must be a manager or admin".into(),
            ));
        }
        let (mut expense, witnessed) = self.load_scoped(expense_id, &acting.company)?;
        if expense.status != ExpenseStatus::PendingApproval {
            return Err(ApprovalError::InvalidState(format!(
                "expense is not pending approval (status {:?})",
                expense.status
            )));
        }
        // When a current approver is designated only they may act. With
        // none designated (degenerate but tolerated state) any manager or
        // admin of the company may.
        if let Some(designated) = &expense.current_approver {
            if designated != &acting.id {
                return Err(ApprovalError::Unauthorized(
                    "you are not the current approver for this expense".into(),
                ));
            }
        }

        match action {
            ApprovalAction::Approved => {
                expense.push_history(
                    &acting.id,
                    action,
                    comment.unwrap_or("Approved").trim().to_string(),
                );
                let next = match &expense.approval_rule {
                    Some(rule_id) => match self.store.get_rule(rule_id)? {
                        Some(rule) => rule.next_approver(Some(&acting.id))?,
                        None => None,
                    },
                    None => None,
                };
                match next {
                    Some(approver) => expense.current_approver = Some(approver),
                    None => {
                        expense.current_approver = None;
                        expense.status = ExpenseStatus::Approved;
                    }
                }
            }
            ApprovalAction::Rejected => {
                // comment presence is enforced by reject_expense
                expense.push_history(
                    &acting.id,
                    action,
                    comment.unwrap_or_default().trim().to_string(),
                );
                expense.current_approver = None;
                expense.status = ExpenseStatus::Rejected;
            }
        }

        debug!(
            expense = %expense.id,
            actor = %acting.id,
            status = ?expense.status,
            next = ?expense.current_approver,
            "approval decision recorded"
        );
        self.store.swap_expense(&expense, &witnessed)?;
        Ok(expense)
    }
}

fn validate_comment(comment: &str) -> Result<()> {
    if comment.chars().count() > 500 {
        return Err(ApprovalError::Validation(
            "comment cannot exceed 500 characters".into(),
        ));
    }
    Ok(())
}
