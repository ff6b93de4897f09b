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

//! Invoicing and payment reconciliation.
//!
//! Every operation that touches an invoice or a payment first takes the
//! owning client's account lock, so billing and payments of one client never
//! interleave while different clients proceed in parallel.

use crate::base::{ClientId, InvoiceId, PaymentId, ShipmentId};
use crate::error::DispatchError;
use crate::invoice::{Invoice, InvoiceLine, InvoiceStatus, Payment, PaymentMethod, PaymentStatus};
use crate::shipment::ShipmentStatus;
use crate::store::Context;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeSet;

/// Where a shipment was billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Billed {
    pub invoice: InvoiceId,
    /// A new invoice was opened for it.
    pub created: bool,
    /// Balance increase (growth of the invoice TTC).
    pub charged: Decimal,
}

/// Cascade of a single-shipment invoice cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceCancellation {
    pub invoice: InvoiceId,
    pub shipment: ShipmentId,
    pub voided: Vec<PaymentId>,
    /// Net balance change: voided payments minus the written-off TTC.
    pub balance_delta: Decimal,
    pub purged_events: usize,
}

/// Recorded balance against the one recomputed from the books.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceAudit {
    pub client: ClientId,
    pub recorded: Decimal,
    pub expected: Decimal,
}

impl BalanceAudit {
    pub fn is_consistent(&self) -> bool {
        self.recorded == self.expected
    }
}

#[derive(Clone)]
pub struct Billing {
    ctx: Context,
}

impl Billing {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Adds the shipment to today's open invoice of its client, or opens a
    /// new one due after the configured payment terms.
    ///
    /// A shipment is billed once, plus once more after each reshipment.
    pub fn bill_shipment(&self, id: ShipmentId) -> Result<Billed, DispatchError> {
        let store = &self.ctx.store;
        let shipment = store.shipment(id)?;
        if shipment.status == ShipmentStatus::Cancelled {
            return Err(DispatchError::Validation(format!(
                "shipment {id} is cancelled and cannot be billed"
            )));
        }
        if !shipment.rebill_pending
            && store
                .invoices_for_shipment(id)
                .iter()
                .any(|i| i.status != InvoiceStatus::Cancelled)
        {
            return Err(DispatchError::Validation(format!(
                "shipment {id} is already billed"
            )));
        }

        let account = store.account(shipment.client)?;
        let today = self.ctx.clock.now().date();
        let line = InvoiceLine {
            shipment: id,
            amount: shipment.amount,
        };

        let billed = {
            let mut data = account.lock();
            let open = store
                .invoices
                .iter()
                .filter(|i| {
                    i.client == shipment.client && i.issued_on == today && i.status.is_open()
                })
                .map(|i| i.id)
                .min();

            let reused = match open {
                Some(invoice_id) => match store.invoices.get_mut(&invoice_id) {
                    Some(mut invoice) => {
                        let charged = invoice.add_line(line);
                        invoice.refresh_status(today);
                        Some(Billed {
                            invoice: invoice_id,
                            created: false,
                            charged,
                        })
                    }
                    None => None,
                },
                None => None,
            };

            let billed = match reused {
                Some(billed) => billed,
                None => {
                    let invoice_id = InvoiceId(store.invoice_ids.next());
                    let mut invoice = Invoice::new(
                        invoice_id,
                        shipment.client,
                        today,
                        today + Duration::days(self.ctx.config.payment_terms_days),
                        self.ctx.config.tax_rate,
                    );
                    let charged = invoice.add_line(line);
                    store.invoices.insert(invoice_id, invoice);
                    Billed {
                        invoice: invoice_id,
                        created: true,
                        charged,
                    }
                }
            };
            data.charge(billed.charged);
            billed
        };

        if let Some(mut s) = store.shipments.get_mut(&id) {
            s.rebill_pending = false;
        }
        tracing::info!(
            shipment = %id,
            invoice = %billed.invoice,
            created = billed.created,
            charged = %billed.charged,
            "shipment billed"
        );
        Ok(billed)
    }

    /// Records a valid payment against an invoice.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Validation`] - non-positive amount.
    /// - [`DispatchError::InvalidTransition`] - invoice cancelled or paid.
    /// - [`DispatchError::InsufficientBalanceGuard`] - amount above the
    ///   unpaid remainder.
    pub fn apply_payment(
        &self,
        invoice_id: InvoiceId,
        amount: Decimal,
        method: PaymentMethod,
        reference: Option<String>,
    ) -> Result<PaymentId, DispatchError> {
        if amount <= Decimal::ZERO {
            return Err(DispatchError::Validation(
                "payment amount must be positive".into(),
            ));
        }
        let store = &self.ctx.store;
        let client = store.invoice(invoice_id)?.client;
        let account = store.account(client)?;
        let now = self.ctx.clock.now();

        let mut data = account.lock();
        let mut invoice = store
            .invoices
            .get_mut(&invoice_id)
            .ok_or(DispatchError::not_found("invoice", invoice_id.0))?;
        if matches!(invoice.status, InvoiceStatus::Cancelled | InvoiceStatus::Paid) {
            return Err(DispatchError::InvalidTransition {
                entity: "invoice",
                from: invoice.status.as_str(),
                to: InvoiceStatus::Paid.as_str(),
            });
        }
        let remaining = invoice.remainder();
        if amount > remaining {
            return Err(DispatchError::InsufficientBalanceGuard { amount, remaining });
        }

        let id = PaymentId(store.payment_ids.next());
        invoice.paid += amount;
        invoice.refresh_status(now.date());
        store.payments.insert(
            id,
            Payment {
                id,
                invoice: invoice_id,
                client,
                amount,
                method,
                reference,
                received_at: now,
                status: PaymentStatus::Valid,
            },
        );
        data.credit_payment(amount);
        tracing::info!(payment = %id, invoice = %invoice_id, %amount, status = invoice.status.as_str(), "payment applied");
        Ok(id)
    }

    /// Voids a valid payment and gives its amount back to the balance.
    pub fn void_payment(&self, payment_id: PaymentId) -> Result<(), DispatchError> {
        let store = &self.ctx.store;
        let payment = store.payment(payment_id)?;
        let account = store.account(payment.client)?;
        let today = self.ctx.clock.now().date();

        let mut data = account.lock();
        let mut invoice = store
            .invoices
            .get_mut(&payment.invoice)
            .ok_or(DispatchError::not_found("invoice", payment.invoice.0))?;
        if invoice.status == InvoiceStatus::Cancelled {
            return Err(DispatchError::InvalidTransition {
                entity: "invoice",
                from: InvoiceStatus::Cancelled.as_str(),
                to: InvoiceStatus::Unpaid.as_str(),
            });
        }
        let mut entry = store
            .payments
            .get_mut(&payment_id)
            .ok_or(DispatchError::not_found("payment", payment_id.0))?;
        if entry.status == PaymentStatus::Void {
            return Err(DispatchError::InvalidTransition {
                entity: "payment",
                from: "VOID",
                to: "VOID",
            });
        }

        entry.status = PaymentStatus::Void;
        invoice.paid -= entry.amount;
        invoice.refresh_status(today);
        data.reverse_payment(entry.amount);
        tracing::info!(payment = %payment_id, invoice = %invoice.id, amount = %entry.amount, "payment voided");
        Ok(())
    }

    /// Cancels an invoice billing exactly one shipment, together with that
    /// shipment.
    ///
    /// Valid payments are voided and the TTC written off, so the balance
    /// drops by the unpaid remainder. The shipment is cancelled, taken off
    /// its run and its tracking history purged.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::MultiShipmentInvoice`] - the invoice bills several
    ///   shipments.
    /// - [`DispatchError::InvalidTransition`] - the invoice is already
    ///   cancelled.
    pub fn cancel_single_shipment_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceCancellation, DispatchError> {
        let store = &self.ctx.store;
        let snapshot = store.invoice(invoice_id)?;
        let shipments: BTreeSet<ShipmentId> = snapshot.lines.iter().map(|l| l.shipment).collect();
        let shipment_id = match shipments.iter().next() {
            Some(only) if shipments.len() == 1 => *only,
            _ => {
                return Err(DispatchError::MultiShipmentInvoice {
                    invoice: invoice_id,
                    shipments: shipments.len(),
                });
            }
        };
        let shipment = store.shipment(shipment_id)?;
        let account = store.account(snapshot.client)?;

        let (voided, balance_delta) = {
            let mut data = account.lock();
            let mut invoice = store
                .invoices
                .get_mut(&invoice_id)
                .ok_or(DispatchError::not_found("invoice", invoice_id.0))?;
            if invoice.status == InvoiceStatus::Cancelled {
                return Err(DispatchError::InvalidTransition {
                    entity: "invoice",
                    from: InvoiceStatus::Cancelled.as_str(),
                    to: InvoiceStatus::Cancelled.as_str(),
                });
            }

            let before = data.balance();
            let mut voided = Vec::new();
            for mut payment in store.payments.iter_mut() {
                if payment.invoice == invoice_id && payment.status == PaymentStatus::Valid {
                    payment.status = PaymentStatus::Void;
                    data.reverse_payment(payment.amount);
                    voided.push(payment.id);
                }
            }
            voided.sort();
            data.write_off(invoice.totals.ttc);
            invoice.paid = Decimal::ZERO;
            invoice.status = InvoiceStatus::Cancelled;
            (voided, data.balance() - before)
        };

        if shipment.status != ShipmentStatus::Cancelled {
            store.unlink_shipment(shipment_id)?;
            if let Some(mut s) = store.shipments.get_mut(&shipment_id) {
                s.status = ShipmentStatus::Cancelled;
                s.rebill_pending = false;
            }
        }
        let purged_events = store.tracking.purge(shipment_id);
        tracing::info!(
            invoice = %invoice_id,
            shipment = %shipment_id,
            voided = voided.len(),
            %balance_delta,
            "single shipment invoice cancelled"
        );
        Ok(InvoiceCancellation {
            invoice: invoice_id,
            shipment: shipment_id,
            voided,
            balance_delta,
            purged_events,
        })
    }

    /// Cancels every outstanding invoice billing `shipment` and writes their
    /// TTC off the balance. Paid invoices stay as they are.
    ///
    /// Returns the cancelled invoices with their written-off TTC.
    pub fn cancel_shipment_invoices(
        &self,
        shipment: ShipmentId,
    ) -> Result<Vec<(InvoiceId, Decimal)>, DispatchError> {
        let store = &self.ctx.store;
        let client = store.shipment(shipment)?.client;
        let account = store.account(client)?;

        let mut data = account.lock();
        let targets: Vec<InvoiceId> = store
            .invoices
            .iter()
            .filter(|i| i.bills(shipment) && i.status.is_outstanding())
            .map(|i| i.id)
            .collect();

        let mut cancelled = Vec::new();
        for id in targets {
            if let Some(mut invoice) = store.invoices.get_mut(&id) {
                invoice.status = InvoiceStatus::Cancelled;
                data.write_off(invoice.totals.ttc);
                cancelled.push((id, invoice.totals.ttc));
            }
        }
        cancelled.sort();
        if !cancelled.is_empty() {
            tracing::info!(%shipment, invoices = cancelled.len(), "invoices cancelled with shipment");
        }
        Ok(cancelled)
    }

    /// Moves unpaid and partially paid invoices past their due date to
    /// `Overdue`. Returns the invoices that changed.
    pub fn mark_overdue_invoices(&self, today: NaiveDate) -> Vec<InvoiceId> {
        let store = &self.ctx.store;
        let mut due: Vec<(InvoiceId, ClientId)> = store
            .invoices
            .iter()
            .filter(|i| i.status.is_open() && i.due_on < today)
            .map(|i| (i.id, i.client))
            .collect();
        due.sort();

        let mut overdue = Vec::new();
        for (id, client) in due {
            let Ok(account) = store.account(client) else {
                continue;
            };
            let _data = account.lock();
            if let Some(mut invoice) = store.invoices.get_mut(&id) {
                invoice.refresh_status(today);
                if invoice.status == InvoiceStatus::Overdue {
                    overdue.push(id);
                }
            }
        }
        if !overdue.is_empty() {
            tracing::info!(count = overdue.len(), %today, "invoices marked overdue");
        }
        overdue
    }

    /// Recomputes the balance from invoices, payments, refunds,
    /// compensations and disbursements.
    pub fn audit_balance(&self, client: ClientId) -> Result<BalanceAudit, DispatchError> {
        let store = &self.ctx.store;
        let account = store.account(client)?;
        let data = account.lock();

        let billed: Decimal = store
            .invoices
            .iter()
            .filter(|i| i.client == client && i.status != InvoiceStatus::Cancelled)
            .map(|i| i.totals.ttc)
            .sum();
        let paid: Decimal = store
            .payments
            .iter()
            .filter(|p| p.client == client && p.status == PaymentStatus::Valid)
            .map(|p| p.amount)
            .sum();
        let mut refunded = Decimal::ZERO;
        let mut disbursed = Decimal::ZERO;
        for incident in store.incidents.iter() {
            let mine: Vec<_> = incident
                .refunds
                .iter()
                .filter(|r| r.client == client)
                .collect();
            if mine.is_empty() {
                continue;
            }
            refunded += mine
                .iter()
                .filter(|r| !r.absorbed)
                .map(|r| r.amount)
                .sum::<Decimal>();
            if !incident.refund_pending {
                disbursed += incident
                    .shortfalls
                    .iter()
                    .filter(|s| s.client == client)
                    .map(|s| s.amount)
                    .sum::<Decimal>();
            }
        }
        let compensated: Decimal = store
            .complaints
            .iter()
            .filter(|c| c.client == client)
            .filter_map(|c| c.compensation)
            .sum();

        let audit = BalanceAudit {
            client,
            recorded: data.balance(),
            expected: billed - paid - refunded - compensated + disbursed,
        };
        if !audit.is_consistent() {
            tracing::warn!(%client, recorded = %audit.recorded, expected = %audit.expected, "balance audit mismatch");
        }
        Ok(audit)
    }
}
