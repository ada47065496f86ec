//! Sled-backed entity store. One named tree per entity kind, records
//! keyed by id and serialized with minicbor.

use crate::company::Company;
use crate::error::ApprovalError;
use crate::expense::Expense;
use crate::rule::ApprovalRule;
use crate::user::User;
use sled::{Db, IVec, Tree};
use std::sync::Arc;

pub struct EntityStore {
    companies: Tree,
    users: Tree,
    rules: Tree,
    expenses: Tree,
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, ApprovalError> {
    minicbor::to_vec(value).map_err(|e| ApprovalError::Codec(e.to_string()))
}

fn decode<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> Result<T, ApprovalError> {
    minicbor::decode(bytes).map_err(|e| ApprovalError::Codec(e.to_string()))
}

impl EntityStore {
    pub fn open(instance: Arc<Db>) -> Result<Self, ApprovalError> {
        Ok(Self {
            companies: instance.open_tree("companies")?,
            users: instance.open_tree("users")?,
            rules: instance.open_tree("rules")?,
            expenses: instance.open_tree("expenses")?,
        })
    }

    pub fn put_company(&self, company: &Company) -> Result<(), ApprovalError> {
        self.companies
            .insert(company.id.as_bytes(), encode(company)?)?;
        Ok(())
    }

    pub fn get_company(&self, id: &str) -> Result<Option<Company>, ApprovalError> {
        self.companies
            .get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn put_user(&self, user: &User) -> Result<(), ApprovalError> {
        self.users.insert(user.id.as_bytes(), encode(user)?)?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>, ApprovalError> {
        self.users
            .get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Full scan filtered by tenant. Fine at this scale; a secondary index
    /// would be the next step if user counts grow.
    pub fn users_in_company(&self, company: &str) -> Result<Vec<User>, ApprovalError> {
        let mut out = vec![];
        for entry in self.users.iter() {
            let (_, bytes) = entry?;
            let user: User = decode(&bytes)?;
            if user.company == company {
                out.push(user);
            }
        }
        Ok(out)
    }

    pub fn put_rule(&self, rule: &ApprovalRule) -> Result<(), ApprovalError> {
        self.rules.insert(rule.id.as_bytes(), encode(rule)?)?;
        Ok(())
    }

    pub fn get_rule(&self, id: &str) -> Result<Option<ApprovalRule>, ApprovalError> {
        self.rules
            .get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn active_rules_for_company(
        &self,
        company: &str,
    ) -> Result<Vec<ApprovalRule>, ApprovalError> {
        let mut out = vec![];
        for entry in self.rules.iter() {
            let (_, bytes) = entry?;
            let rule: ApprovalRule = decode(&bytes)?;
            if rule.company == company && rule.is_active {
                out.push(rule);
            }
        }
        Ok(out)
    }

    pub fn insert_expense(&self, expense: &Expense) -> Result<(), ApprovalError> {
        self.expenses
            .insert(expense.id.as_bytes(), encode(expense)?)?;
        Ok(())
    }

    /// Fetch an expense together with the raw bytes it was decoded from.
    /// The bytes are the witness for a later [`swap_expense`] call.
    pub fn get_expense_raw(&self, id: &str) -> Result<Option<(Expense, IVec)>, ApprovalError> {
        match self.expenses.get(id.as_bytes())? {
            Some(bytes) => {
                let expense: Expense = decode(&bytes)?;
                Ok(Some((expense, bytes)))
            }
            None => Ok(None),
        }
    }

    /// Persist a mutated expense only if the stored record still matches
    /// the bytes originally read. Two racing transitions on the same
    /// expense cannot both win: the loser gets an invalid-state error and
    /// nothing is merged silently.
    pub fn swap_expense(&self, expense: &Expense, witnessed: &IVec) -> Result<(), ApprovalError> {
        let updated = encode(expense)?;
        self.expenses
            .compare_and_swap(expense.id.as_bytes(), Some(witnessed), Some(updated))?
            .map_err(|_| {
                ApprovalError::InvalidState("expense changed concurrently, retry the action".into())
            })
    }

    pub fn expenses_for_company(&self, company: &str) -> Result<Vec<Expense>, ApprovalError> {
        let mut out = vec![];
        for entry in self.expenses.iter() {
            let (_, bytes) = entry?;
            let expense: Expense = decode(&bytes)?;
            if expense.company == company {
                out.push(expense);
            }
        }
        Ok(out)
    }
}
