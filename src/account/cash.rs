//! Cash account: buying power is cash minus what open buy orders reserve

use crate::account::{Account, Ledger, LedgerError};
use crate::PriceMap;

/// Account without margin credit
#[derive(Debug, Clone, Default)]
pub struct CashAccount {
    ledger: Ledger,
}

impl CashAccount {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            ledger: Ledger::new(initial_cash),
        }
    }

    pub fn from_ledger(ledger: Ledger) -> Self {
        Self { ledger }
    }
}

impl Account for CashAccount {
    fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    fn cash_available_to_invest(&self, prices: &PriceMap) -> Result<f64, LedgerError> {
        Ok(self.ledger.cash() - self.ledger.open_order_cost(prices)?)
    }

    fn buying_power(&self, prices: &PriceMap) -> Result<f64, LedgerError> {
        self.cash_available_to_invest(prices)
    }

    fn equity(&self, prices: &PriceMap) -> Result<f64, LedgerError> {
        self.ledger.portfolio_value(prices)
    }
}
