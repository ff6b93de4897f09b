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

//! Invoices and payments.
//!
//! Invoice status is derived from the unpaid remainder and the due date:
//!
//! | remainder           | due date passed | status          |
//! |---------------------|-----------------|-----------------|
//! | `<= 0`              | any             | Paid            |
//! | `0 < r < TTC`       | yes             | Overdue         |
//! | `0 < r < TTC`       | no              | PartiallyPaid   |
//! | `== TTC`            | yes             | Overdue         |
//! | `== TTC`            | no              | Unpaid          |
//!
//! Cancelled is sticky and never derived.

use crate::base::{ClientId, InvoiceId, PaymentId, ShipmentId};
use crate::ledger::{InvoiceTotals, compute_totals};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "UNPAID",
            InvoiceStatus::PartiallyPaid => "PARTIALLY_PAID",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Overdue => "OVERDUE",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }

    /// Still accepting new shipments of the same day.
    pub fn is_open(&self) -> bool {
        matches!(self, InvoiceStatus::Unpaid | InvoiceStatus::PartiallyPaid)
    }

    /// Money is still expected on it.
    pub fn is_outstanding(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Unpaid | InvoiceStatus::PartiallyPaid | InvoiceStatus::Overdue
        )
    }
}

/// One billed shipment with the HT price at billing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub shipment: ShipmentId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub client: ClientId,
    pub issued_on: NaiveDate,
    pub due_on: NaiveDate,
    pub tax_rate: Decimal,
    pub lines: Vec<InvoiceLine>,
    pub totals: InvoiceTotals,
    /// Sum of valid payments.
    pub paid: Decimal,
    pub status: InvoiceStatus,
}

impl Invoice {
    pub(crate) fn new(
        id: InvoiceId,
        client: ClientId,
        issued_on: NaiveDate,
        due_on: NaiveDate,
        tax_rate: Decimal,
    ) -> Self {
        Self {
            id,
            client,
            issued_on,
            due_on,
            tax_rate,
            lines: Vec::new(),
            totals: InvoiceTotals::default(),
            paid: Decimal::ZERO,
            status: InvoiceStatus::Unpaid,
        }
    }

    pub fn bills(&self, shipment: ShipmentId) -> bool {
        self.lines.iter().any(|l| l.shipment == shipment)
    }

    /// `TTC - Σ valid payments`.
    pub fn remainder(&self) -> Decimal {
        self.totals.ttc - self.paid
    }

    /// Adds a line and recomputes totals. Returns the TTC increase.
    pub(crate) fn add_line(&mut self, line: InvoiceLine) -> Decimal {
        let before = self.totals.ttc;
        self.lines.push(line);
        self.recompute();
        self.totals.ttc - before
    }

    fn recompute(&mut self) {
        let ht: Decimal = self.lines.iter().map(|l| l.amount).sum();
        self.totals = compute_totals(ht, self.tax_rate);
    }

    pub(crate) fn refresh_status(&mut self, today: NaiveDate) {
        if self.status != InvoiceStatus::Cancelled {
            self.status = derive_invoice_status(self.totals.ttc, self.paid, self.due_on, today);
        }
    }
}

/// Status of a non-cancelled invoice from its figures.
pub fn derive_invoice_status(
    ttc: Decimal,
    paid: Decimal,
    due_on: NaiveDate,
    today: NaiveDate,
) -> InvoiceStatus {
    let remainder = ttc - paid;
    let past_due = today > due_on;
    if remainder <= Decimal::ZERO {
        InvoiceStatus::Paid
    } else if past_due {
        InvoiceStatus::Overdue
    } else if remainder < ttc {
        InvoiceStatus::PartiallyPaid
    } else {
        InvoiceStatus::Unpaid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Cheque,
    BankTransfer,
    Card,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Valid,
    Void,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice: InvoiceId,
    pub client: ClientId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub received_at: NaiveDateTime,
    pub status: PaymentStatus,
}
