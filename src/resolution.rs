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

//! Incident and complaint resolution.
//!
//! Resolving an incident runs a cascade over every affected shipment:
//!
//! 1. refund `TTC × rate` to the client balance
//! 2. apply the outcome (cancel with its invoices, reship, or continue)
//! 3. notify the operator: manual refund for a negative balance, otherwise
//!    compensation applied
//!
//! Every precondition of the cascade is checked before the first write.

use crate::base::{
    AgentId, ClientId, ComplaintId, IncidentId, InvoiceId, NotificationId, ShipmentId,
};
use crate::billing::Billing;
use crate::dispatch::{DispatchEngine, Redispatch};
use crate::error::DispatchError;
use crate::incident::{
    Complaint, ComplaintStatus, Incident, IncidentKind, IncidentStatus, IncidentTarget, Outcome,
    Severity, Shortfall, ShipmentRefund,
};
use crate::ledger::{refund_for, tax_inclusive};
use crate::notification::{NewNotification, NotificationKind, Subject};
use crate::shipment::{Shipment, ShipmentStatus};
use crate::store::Context;
use crate::tariff::Tariff;
use crate::tracking::TrackingKind;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything an incident resolution changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncidentResolution {
    pub incident: IncidentId,
    pub outcome: Outcome,
    pub refunds: Vec<ShipmentRefund>,
    pub cancelled_invoices: Vec<InvoiceId>,
    pub redispatched: Vec<Redispatch>,
    /// Reshipped shipments still waiting for a run.
    pub unassigned: Vec<ShipmentId>,
    pub shortfalls: Vec<Shortfall>,
    pub notification: Option<NotificationId>,
}

#[derive(Clone)]
pub struct Resolution {
    ctx: Context,
    dispatch: DispatchEngine,
    billing: Billing,
}

impl Resolution {
    pub fn new(ctx: Context, dispatch: DispatchEngine, billing: Billing) -> Self {
        Self {
            ctx,
            dispatch,
            billing,
        }
    }

    /// Files an incident against a shipment or a whole run and asks an
    /// operator to assign an agent.
    pub fn report_incident(
        &self,
        target: IncidentTarget,
        kind: IncidentKind,
        severity: Severity,
        description: impl Into<String>,
    ) -> Result<IncidentId, DispatchError> {
        let store = &self.ctx.store;
        let affected = match target {
            IncidentTarget::Shipment(shipment) => vec![store.shipment(shipment)?.id],
            IncidentTarget::Run(run) => store.run(run)?.shipments,
        };
        let now = self.ctx.clock.now();
        let description = description.into();
        let id = IncidentId(store.incident_ids.next());
        store.incidents.insert(
            id,
            Incident {
                id,
                target,
                kind,
                severity,
                description: description.clone(),
                reported_at: now,
                agent: None,
                status: IncidentStatus::Reported,
                refund_rate: None,
                refunds: Vec::new(),
                outcome: None,
                solution: None,
                refund_pending: false,
                shortfalls: Vec::new(),
            },
        );
        for shipment in affected {
            store.tracking.append(
                shipment,
                now,
                TrackingKind::Incident { incident: id },
                description.clone(),
            );
        }
        self.ctx.notifications.raise(
            NewNotification::new(
                NotificationKind::IncidentReported,
                Subject::Incident(id),
                format!("{severity:?} incident {id}: {}", kind.cause()),
            ),
            now,
        );
        tracing::info!(incident = %id, ?kind, ?severity, ?target, "incident reported");
        Ok(id)
    }

    /// Assigns or reassigns the agent in charge.
    pub fn assign_incident_agent(&self, id: IncidentId, agent: AgentId) -> Result<(), DispatchError> {
        let mut incident = self
            .ctx
            .store
            .incidents
            .get_mut(&id)
            .ok_or(DispatchError::not_found("incident", id.0))?;
        incident.status = incident.status.assign()?;
        incident.agent = Some(agent);
        tracing::info!(incident = %id, %agent, "incident agent assigned");
        Ok(())
    }

    /// Resolves an incident and runs its cascade.
    ///
    /// The applied outcome follows the kind: loss, damage, accident and
    /// technical failure always cancel; recipient-caused kinds take
    /// `Reship` or `Cancel`; the rest take `Continue` or `Cancel`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidTransition`] - incident already resolved, or
    ///   an affected shipment cannot take the outcome.
    /// - [`DispatchError::Validation`] - outcome not offered for the kind.
    /// - [`DispatchError::NoTariff`] - a reshipment cannot be re-priced.
    pub fn resolve_incident(
        &self,
        id: IncidentId,
        choice: Outcome,
        solution: impl Into<String>,
    ) -> Result<IncidentResolution, DispatchError> {
        let store = &self.ctx.store;
        let incident = store.incident(id)?;
        incident.status.resolve()?;
        let outcome = Outcome::settle(incident.kind, choice)?;
        let rate = incident.kind.refund_rate();
        let tax_rate = self.ctx.config.tax_rate;

        let shipments = self.affected_shipments(&incident)?;
        let mut prices: BTreeMap<ShipmentId, Decimal> = BTreeMap::new();
        for shipment in &shipments {
            store.account(shipment.client)?;
            match outcome {
                Outcome::Cancel => {
                    shipment.status.transition(ShipmentStatus::Cancelled)?;
                }
                Outcome::Reship => {
                    shipment.status.transition(ShipmentStatus::Reshipped)?;
                    let tariff = self.reship_price(shipment)?;
                    prices.insert(
                        shipment.id,
                        tariff.price(shipment.weight_kg, shipment.volume_m3),
                    );
                }
                Outcome::Continue => {}
            }
        }

        // Claim the incident; a concurrent resolution loses here.
        {
            let mut entry = store
                .incidents
                .get_mut(&id)
                .ok_or(DispatchError::not_found("incident", id.0))?;
            entry.status = entry.status.resolve()?;
        }

        let now = self.ctx.clock.now();
        let solution = solution.into();
        let mut refunds = Vec::new();
        let mut cancelled_invoices = Vec::new();
        let mut redispatched = Vec::new();
        let mut unassigned = Vec::new();

        for shipment in &shipments {
            let amount = refund_for(tax_inclusive(shipment.amount, tax_rate), rate);
            if amount > Decimal::ZERO {
                store.account(shipment.client)?.lock().refund(amount);
            }
            store.tracking.append(
                shipment.id,
                now,
                TrackingKind::Resolved { incident: id },
                format!("{}: {solution}", incident.kind.cause()),
            );

            let mut absorbed = false;
            match outcome {
                Outcome::Cancel => {
                    store.unlink_shipment(shipment.id)?;
                    if let Some(mut s) = store.shipments.get_mut(&shipment.id) {
                        s.status = ShipmentStatus::Cancelled;
                        s.rebill_pending = false;
                    }
                    store.tracking.append(
                        shipment.id,
                        now,
                        TrackingKind::Cancelled,
                        format!("cancelled after incident {id}"),
                    );
                    let cancelled = self.billing.cancel_shipment_invoices(shipment.id)?;
                    if !cancelled.is_empty() && amount > Decimal::ZERO {
                        store.account(shipment.client)?.lock().absorb_refund(amount);
                        absorbed = true;
                    }
                    cancelled_invoices.extend(cancelled.into_iter().map(|(invoice, _)| invoice));
                }
                Outcome::Reship => {
                    store.unlink_shipment(shipment.id)?;
                    if let Some(mut s) = store.shipments.get_mut(&shipment.id) {
                        s.status = ShipmentStatus::Reshipped;
                        s.delivered_at = None;
                        s.rebill_pending = true;
                        if let Some(price) = prices.get(&shipment.id) {
                            s.amount = *price;
                        }
                    }
                    store.tracking.append(
                        shipment.id,
                        now,
                        TrackingKind::Reshipped,
                        format!("reshipped after incident {id}"),
                    );
                    match self.dispatch.redispatch(shipment.id) {
                        Ok(placed) => redispatched.push(placed),
                        Err(e) => {
                            tracing::warn!(shipment = %shipment.id, error = %e, "reshipment left unassigned");
                            self.dispatch.flag_unassigned(shipment.id);
                            unassigned.push(shipment.id);
                        }
                    }
                }
                Outcome::Continue => {}
            }

            if amount > Decimal::ZERO {
                refunds.push(ShipmentRefund {
                    shipment: shipment.id,
                    client: shipment.client,
                    amount,
                    absorbed,
                });
            }
        }

        let shortfalls = self.shortfalls(&refunds)?;
        let refund_total: Decimal = refunds.iter().map(|r| r.amount).sum();
        let notification = if !shortfalls.is_empty() {
            let owed: Decimal = shortfalls.iter().map(|s| s.amount).sum();
            Some(self.ctx.notifications.raise(
                NewNotification::new(
                    NotificationKind::ManualRefundRequired,
                    Subject::Incident(id),
                    format!("incident {id}: {owed} to pay back to the client"),
                )
                .with_amount(owed),
                now,
            ))
        } else if refund_total > Decimal::ZERO {
            Some(self.ctx.notifications.raise(
                NewNotification::new(
                    NotificationKind::CompensationApplied,
                    Subject::Incident(id),
                    format!("incident {id}: {refund_total} credited to the balance"),
                )
                .with_amount(refund_total),
                now,
            ))
        } else {
            None
        };

        if let Some(mut entry) = store.incidents.get_mut(&id) {
            entry.refund_rate = Some(rate);
            entry.refunds = refunds.clone();
            entry.outcome = Some(outcome);
            entry.solution = Some(solution);
            entry.refund_pending = refund_total > Decimal::ZERO;
            entry.shortfalls = shortfalls.clone();
        }
        cancelled_invoices.sort();
        cancelled_invoices.dedup();
        tracing::info!(
            incident = %id,
            ?outcome,
            shipments = shipments.len(),
            refunded = %refund_total,
            "incident resolved"
        );

        Ok(IncidentResolution {
            incident: id,
            outcome,
            refunds,
            cancelled_invoices,
            redispatched,
            unassigned,
            shortfalls,
            notification,
        })
    }

    pub fn close_incident(&self, id: IncidentId) -> Result<(), DispatchError> {
        let mut incident = self
            .ctx
            .store
            .incidents
            .get_mut(&id)
            .ok_or(DispatchError::not_found("incident", id.0))?;
        incident.status = incident.status.close()?;
        tracing::info!(incident = %id, "incident closed");
        Ok(())
    }

    /// Confirms the refund of an incident was handed over. A manual refund
    /// is recorded as a disbursement, bringing the balance back up by the
    /// shortfall. Returns the disbursed total.
    pub fn confirm_refund(&self, id: IncidentId) -> Result<Decimal, DispatchError> {
        let store = &self.ctx.store;
        let shortfalls = {
            let mut incident = store
                .incidents
                .get_mut(&id)
                .ok_or(DispatchError::not_found("incident", id.0))?;
            if !incident.refund_pending {
                return Err(DispatchError::Validation(format!(
                    "incident {id} has no refund awaiting confirmation"
                )));
            }
            incident.refund_pending = false;
            incident.shortfalls.clone()
        };

        let mut disbursed = Decimal::ZERO;
        for shortfall in &shortfalls {
            store.account(shortfall.client)?.lock().disburse(shortfall.amount);
            disbursed += shortfall.amount;
        }
        tracing::info!(incident = %id, %disbursed, "refund confirmed");
        Ok(disbursed)
    }

    pub fn open_complaint(
        &self,
        client: ClientId,
        shipment: Option<ShipmentId>,
        subject: impl Into<String>,
    ) -> Result<ComplaintId, DispatchError> {
        let store = &self.ctx.store;
        let subject = subject.into();
        if subject.trim().is_empty() {
            return Err(DispatchError::Validation("complaint subject is empty".into()));
        }
        store.account(client)?;
        if let Some(shipment) = shipment {
            if store.shipment(shipment)?.client != client {
                return Err(DispatchError::Validation(format!(
                    "shipment {shipment} does not belong to client {client}"
                )));
            }
        }

        let now = self.ctx.clock.now();
        let id = ComplaintId(store.complaint_ids.next());
        store.complaints.insert(
            id,
            Complaint {
                id,
                client,
                shipment,
                subject: subject.clone(),
                opened_at: now,
                agent: None,
                response: None,
                compensation: None,
                cancel_reason: None,
                status: ComplaintStatus::Open,
            },
        );
        self.ctx.notifications.raise(
            NewNotification::new(
                NotificationKind::ComplaintOpened,
                Subject::Complaint(id),
                format!("complaint {id} from {client}: {subject}"),
            ),
            now,
        );
        tracing::info!(complaint = %id, %client, "complaint opened");
        Ok(id)
    }

    pub fn assign_complaint_agent(&self, id: ComplaintId, agent: AgentId) -> Result<(), DispatchError> {
        self.update_complaint(id, ComplaintStatus::InProgress, |c| c.agent = Some(agent))
    }

    pub fn respond_to_complaint(
        &self,
        id: ComplaintId,
        response: impl Into<String>,
    ) -> Result<(), DispatchError> {
        let response = response.into();
        if response.trim().is_empty() {
            return Err(DispatchError::Validation("complaint response is empty".into()));
        }
        self.update_complaint(id, ComplaintStatus::AwaitingClient, |c| {
            c.response = Some(response)
        })
    }

    /// Resolves a complaint. A compensation is credited to the client
    /// balance.
    pub fn resolve_complaint(
        &self,
        id: ComplaintId,
        compensation: Option<Decimal>,
    ) -> Result<(), DispatchError> {
        if compensation.is_some_and(|c| c <= Decimal::ZERO) {
            return Err(DispatchError::Validation(
                "compensation must be positive".into(),
            ));
        }
        let client = self.ctx.store.complaint(id)?.client;
        let account = self.ctx.store.account(client)?;
        self.update_complaint(id, ComplaintStatus::Resolved, |c| {
            c.compensation = compensation
        })?;
        if let Some(amount) = compensation {
            account.lock().refund(amount);
            tracing::info!(complaint = %id, %client, %amount, "complaint compensation applied");
        }
        Ok(())
    }

    pub fn close_complaint(&self, id: ComplaintId) -> Result<(), DispatchError> {
        self.update_complaint(id, ComplaintStatus::Closed, |_| {})
    }

    /// Cancels a complaint before it is closed. The reason is mandatory.
    pub fn cancel_complaint(
        &self,
        id: ComplaintId,
        reason: impl Into<String>,
    ) -> Result<(), DispatchError> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(DispatchError::Validation(
                "a cancellation reason is required".into(),
            ));
        }
        self.update_complaint(id, ComplaintStatus::Cancelled, |c| {
            c.cancel_reason = Some(reason)
        })
    }

    fn update_complaint(
        &self,
        id: ComplaintId,
        to: ComplaintStatus,
        apply: impl FnOnce(&mut Complaint),
    ) -> Result<(), DispatchError> {
        let mut complaint = self
            .ctx
            .store
            .complaints
            .get_mut(&id)
            .ok_or(DispatchError::not_found("complaint", id.0))?;
        complaint.status = complaint.status.transition(to)?;
        apply(complaint.value_mut());
        tracing::info!(complaint = %id, status = to.as_str(), "complaint updated");
        Ok(())
    }

    /// Shipments an incident applies to: its shipment, or every shipment of
    /// its run. Cancelled shipments are left out; they are no longer billed
    /// and take no refund.
    fn affected_shipments(&self, incident: &Incident) -> Result<Vec<Shipment>, DispatchError> {
        let store = &self.ctx.store;
        let ids = match incident.target {
            IncidentTarget::Shipment(id) => vec![id],
            IncidentTarget::Run(run) => store.run(run)?.shipments,
        };
        let mut shipments = Vec::new();
        for id in ids {
            let shipment = store.shipment(id)?;
            if shipment.status.is_terminal() {
                tracing::debug!(incident = %incident.id, shipment = %id, "cancelled shipment skipped");
                continue;
            }
            shipments.push(shipment);
        }
        Ok(shipments)
    }

    fn reship_price(&self, shipment: &Shipment) -> Result<Tariff, DispatchError> {
        self.ctx
            .tariffs
            .lookup(shipment.destination, shipment.tier)
            .ok_or(DispatchError::NoTariff {
                destination: shipment.destination,
                tier: shipment.tier,
            })
    }

    /// Credit owed back by hand to each refunded client left with a negative
    /// balance, capped at what the incident refunded them.
    fn shortfalls(&self, refunds: &[ShipmentRefund]) -> Result<Vec<Shortfall>, DispatchError> {
        let mut per_client: BTreeMap<ClientId, Decimal> = BTreeMap::new();
        for refund in refunds {
            *per_client.entry(refund.client).or_default() += refund.amount;
        }
        let mut shortfalls = Vec::new();
        for (client, refunded) in per_client {
            let balance = self.ctx.store.account(client)?.balance();
            if balance < Decimal::ZERO {
                shortfalls.push(Shortfall {
                    client,
                    amount: (-balance).min(refunded),
                });
            }
        }
        Ok(shortfalls)
    }
}
