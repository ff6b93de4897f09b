// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Money primitives and client balance bookkeeping.
//!
//! The client balance is positive when the client owes the operator. It is
//! only ever moved through [`AccountData`], which keeps the four ledger
//! components alongside it:
//!
//! ```text
//! balance == billed - paid - refunded + disbursed
//! ```
//!
//! - `billed`: TTC of every non-cancelled invoice
//! - `paid`: valid payments
//! - `refunded`: incident refunds and complaint compensations still standing
//! - `disbursed`: manual refunds handed back to the client outside the ledger
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use parcel_dispatch::ledger::{compute_totals, ClientAccount};
//! use parcel_dispatch::{Client, ClientId};
//!
//! let totals = compute_totals(dec!(1000), dec!(0.19));
//! assert_eq!(totals.ttc, dec!(1190.00));
//!
//! let account = ClientAccount::new(Client::new(ClientId(1), "Sarl Atlas"));
//! assert_eq!(account.balance(), dec!(0));
//! ```

use crate::base::ClientId;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;

/// Decimal places kept on every monetary amount.
pub const MONEY_PRECISION: u32 = 2;

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp(MONEY_PRECISION)
}

/// HT / TVA / TTC triple of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub ht: Decimal,
    pub tva: Decimal,
    pub ttc: Decimal,
}

/// `TVA = HT × rate`, `TTC = HT + TVA`, each rounded to [`MONEY_PRECISION`].
pub fn compute_totals(ht: Decimal, tax_rate: Decimal) -> InvoiceTotals {
    let ht = round_money(ht);
    let tva = round_money(ht * tax_rate);
    InvoiceTotals {
        ht,
        tva,
        ttc: ht + tva,
    }
}

/// Tax-inclusive price of a single HT amount.
pub fn tax_inclusive(amount: Decimal, tax_rate: Decimal) -> Decimal {
    compute_totals(amount, tax_rate).ttc
}

/// Refund owed for an amount at a percentage rate (0-100).
pub fn refund_for(amount: Decimal, rate_percent: Decimal) -> Decimal {
    round_money(amount * rate_percent / Decimal::ONE_HUNDRED)
}

/// Client identity and contact.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Client {
    pub fn new(id: ClientId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: None,
            phone: None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct AccountData {
    client: Client,
    balance: Decimal,
    billed: Decimal,
    paid: Decimal,
    refunded: Decimal,
    disbursed: Decimal,
}

impl AccountData {
    fn new(client: Client) -> Self {
        Self {
            client,
            balance: Decimal::ZERO,
            billed: Decimal::ZERO,
            paid: Decimal::ZERO,
            refunded: Decimal::ZERO,
            disbursed: Decimal::ZERO,
        }
    }

    fn assert_invariants(&self) {
        debug_assert_eq!(
            self.balance,
            self.billed - self.paid - self.refunded + self.disbursed,
            "Invariant violated: balance drifted from its ledger components"
        );
        debug_assert!(
            self.billed >= Decimal::ZERO,
            "Invariant violated: billed total went negative: {}",
            self.billed
        );
        debug_assert!(
            self.paid >= Decimal::ZERO,
            "Invariant violated: paid total went negative: {}",
            self.paid
        );
    }

    pub(crate) fn client_id(&self) -> ClientId {
        self.client.id
    }

    pub(crate) fn balance(&self) -> Decimal {
        self.balance
    }

    /// Adds invoice TTC (new invoice or growth of an open one).
    pub(crate) fn charge(&mut self, amount: Decimal) {
        self.billed += amount;
        self.balance += amount;
        self.assert_invariants();
    }

    /// Removes the TTC of a cancelled invoice.
    pub(crate) fn write_off(&mut self, amount: Decimal) {
        self.billed -= amount;
        self.balance -= amount;
        self.assert_invariants();
    }

    pub(crate) fn credit_payment(&mut self, amount: Decimal) {
        self.paid += amount;
        self.balance -= amount;
        self.assert_invariants();
    }

    pub(crate) fn reverse_payment(&mut self, amount: Decimal) {
        self.paid -= amount;
        self.balance += amount;
        self.assert_invariants();
    }

    /// Incident refund or complaint compensation.
    pub(crate) fn refund(&mut self, amount: Decimal) {
        self.refunded += amount;
        self.balance -= amount;
        self.assert_invariants();
    }

    /// A refund whose invoice got cancelled: the write-off already credits
    /// the client, so the refund stops counting.
    pub(crate) fn absorb_refund(&mut self, amount: Decimal) {
        self.refunded -= amount;
        self.balance += amount;
        self.assert_invariants();
    }

    /// Cash handed back to the client for a negative balance.
    pub(crate) fn disburse(&mut self, amount: Decimal) {
        self.disbursed += amount;
        self.balance += amount;
        self.assert_invariants();
    }
}

/// Client account: identity plus the balance ledger.
///
/// The inner mutex is the per-client serialization point: every
/// read-modify-write of invoices or balance for one client happens under it.
#[derive(Debug)]
pub struct ClientAccount {
    inner: Mutex<AccountData>,
}

impl ClientAccount {
    pub fn new(client: Client) -> Self {
        Self {
            inner: Mutex::new(AccountData::new(client)),
        }
    }

    pub fn client(&self) -> Client {
        self.inner.lock().client.clone()
    }

    pub fn balance(&self) -> Decimal {
        self.inner.lock().balance
    }

    pub fn billed(&self) -> Decimal {
        self.inner.lock().billed
    }

    pub fn paid(&self) -> Decimal {
        self.inner.lock().paid
    }

    pub fn refunded(&self) -> Decimal {
        self.inner.lock().refunded
    }

    pub fn disbursed(&self) -> Decimal {
        self.inner.lock().disbursed
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, AccountData> {
        self.inner.lock()
    }
}

impl Serialize for ClientAccount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.inner.lock();
        let mut state = serializer.serialize_struct("ClientAccount", 3)?;
        state.serialize_field("client", &data.client.id)?;
        state.serialize_field("name", &data.client.name)?;
        state.serialize_field("balance", &round_money(data.balance))?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn data() -> AccountData {
        AccountData::new(Client::new(ClientId(1), "Sarl Atlas"))
    }

    #[test]
    fn totals_apply_tax_rate() {
        let totals = compute_totals(dec!(1000), dec!(0.19));
        assert_eq!(totals.ht, dec!(1000));
        assert_eq!(totals.tva, dec!(190.00));
        assert_eq!(totals.ttc, dec!(1190.00));
    }

    #[test]
    fn totals_round_tva_to_cents() {
        let totals = compute_totals(dec!(333.33), dec!(0.19));
        assert_eq!(totals.tva, dec!(63.33));
        assert_eq!(totals.ttc, dec!(396.66));
    }

    #[test]
    fn refund_rate_is_a_percentage() {
        assert_eq!(refund_for(dec!(1190), dec!(100)), dec!(1190));
        assert_eq!(refund_for(dec!(1190), dec!(5)), dec!(59.50));
        assert_eq!(refund_for(dec!(1190), dec!(0)), dec!(0));
    }

    #[test]
    fn charge_and_payment_move_balance() {
        let mut data = data();
        data.charge(dec!(1190));
        data.credit_payment(dec!(400));
        assert_eq!(data.balance, dec!(790));
        data.reverse_payment(dec!(400));
        assert_eq!(data.balance, dec!(1190));
    }

    #[test]
    fn refund_can_drive_balance_negative() {
        let mut data = data();
        data.charge(dec!(1190));
        data.credit_payment(dec!(1190));
        data.refund(dec!(1190));
        assert_eq!(data.balance, dec!(-1190));
        data.disburse(dec!(1190));
        assert_eq!(data.balance, Decimal::ZERO);
    }

    #[test]
    fn absorbed_refund_plus_write_off_nets_to_refund() {
        let mut data = data();
        data.charge(dec!(1190));
        data.refund(dec!(1190));
        assert_eq!(data.balance, Decimal::ZERO);
        data.write_off(dec!(1190));
        data.absorb_refund(dec!(1190));
        assert_eq!(data.balance, Decimal::ZERO);
        assert_eq!(data.billed, Decimal::ZERO);
        assert_eq!(data.refunded, Decimal::ZERO);
    }

    #[test]
    fn serializer_rounds_balance_to_cents() {
        let account = ClientAccount::new(Client::new(ClientId(7), "Eurl Tassili"));
        account.lock().charge(dec!(123.456));

        let json = serde_json::to_string(&account).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["client"], 7);
        assert_eq!(parsed["name"], "Eurl Tassili");
        assert_eq!(parsed["balance"].as_str().unwrap(), "123.46");
    }

    #[test]
    fn money_precision_constant_is_two() {
        assert_eq!(MONEY_PRECISION, 2);
    }
}
