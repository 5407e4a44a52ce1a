use std::collections::BTreeMap;

use crate::core::Debt;

/// In-memory debt records for the HTTP host. Ids are assigned in insertion
/// order and never reused.
#[derive(Debug, Default)]
pub struct DebtRegistry {
    debts: BTreeMap<u32, Debt>,
    next_id: u32,
}

impl DebtRegistry {
    pub fn insert(&mut self, debtor_name: String, amount: f64) -> Debt {
        self.next_id += 1;
        let debt = Debt {
            id: self.next_id,
            debtor_name,
            amount,
        };
        self.debts.insert(debt.id, debt.clone());
        debt
    }

    pub fn update(&mut self, id: u32, debtor_name: String, amount: f64) -> Option<Debt> {
        let debt = self.debts.get_mut(&id)?;
        debt.debtor_name = debtor_name;
        debt.amount = amount;
        Some(debt.clone())
    }

    pub fn get(&self, id: u32) -> Option<&Debt> {
        self.debts.get(&id)
    }

    pub fn list(&self) -> Vec<Debt> {
        self.debts.values().cloned().collect()
    }

    pub fn remove(&mut self, id: u32) -> Option<Debt> {
        self.debts.remove(&id)
    }
}
