use std::collections::BTreeSet;

use crate::types::{AccountId, AdminAction};

/// External authorization check guarding administrative operations.
///
/// The splitter only consumes the boolean answer; who holds which role is
/// the implementor's business.
pub trait AccessGate: Send + Sync {
    fn is_authorized(&self, caller: &AccountId, action: AdminAction) -> bool;
}

/// Flat admin list: every listed identity may perform every action.
#[derive(Debug, Clone, Default)]
pub struct AdminSet {
    admins: BTreeSet<AccountId>,
}

impl AdminSet {
    pub fn new(admins: impl IntoIterator<Item = AccountId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }

    pub fn grant(&mut self, admin: AccountId) {
        self.admins.insert(admin);
    }

    pub fn revoke(&mut self, admin: &AccountId) -> bool {
        self.admins.remove(admin)
    }

    pub fn contains(&self, admin: &AccountId) -> bool {
        self.admins.contains(admin)
    }
}

impl AccessGate for AdminSet {
    fn is_authorized(&self, caller: &AccountId, _action: AdminAction) -> bool {
        self.contains(caller)
    }
}
