//! Companies: the tenant boundary. All lookups elsewhere are scoped to a
//! single company id.

use crate::expense::Currency;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct CompanySettings {
    #[n(0)]
    pub allow_multi_currency: bool,
    #[n(1)]
    pub require_receipt: bool,
    /// Expenses at or below this amount could skip approval. Carried in
    /// the data model for rule-authoring parity; the lifecycle never
    /// consults it.
    #[n(2)]
    pub auto_approval_limit: u64,
}

impl Default for CompanySettings {
    fn default() -> Self {
        Self {
            allow_multi_currency: true,
            require_receipt: true,
            auto_approval_limit: 0,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Company {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub country: String,
    /// The accounting currency every expense is normalized into.
    #[n(3)]
    pub base_currency: Currency,
    #[n(4)]
    pub currency_symbol: String,
    #[n(5)]
    pub is_active: bool,
    #[n(6)]
    pub settings: CompanySettings,
}
