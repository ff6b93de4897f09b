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

//! Shared entity tables and the handles every component receives.
//!
//! # Lock order
//!
//! Components never hold two entries of the same table at once, and nest
//! entries of different tables only in this order:
//!
//! - client account mutex → invoices → payments
//! - runs → shipments → drivers → vehicles
//!
//! Everything else copies data out and drops the entry before moving on.

use crate::base::{
    ClientId, ComplaintId, DestinationId, IncidentId, InvoiceId, PaymentId, RunId, Sequence,
    ShipmentId,
};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::DispatchError;
use crate::incident::{Complaint, Incident};
use crate::invoice::{Invoice, Payment};
use crate::ledger::ClientAccount;
use crate::notification::NotificationCenter;
use crate::resource::ResourceRegistry;
use crate::run::Run;
use crate::shipment::Shipment;
use crate::tariff::{Destination, TariffBook};
use crate::tracking::TrackingLog;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Store {
    pub(crate) clients: DashMap<ClientId, Arc<ClientAccount>>,
    pub(crate) destinations: DashMap<DestinationId, Destination>,
    pub(crate) shipments: DashMap<ShipmentId, Shipment>,
    pub(crate) runs: DashMap<RunId, Run>,
    pub(crate) invoices: DashMap<InvoiceId, Invoice>,
    pub(crate) payments: DashMap<PaymentId, Payment>,
    pub(crate) incidents: DashMap<IncidentId, Incident>,
    pub(crate) complaints: DashMap<ComplaintId, Complaint>,
    pub(crate) tracking: TrackingLog,
    pub(crate) client_ids: Sequence,
    pub(crate) destination_ids: Sequence,
    pub(crate) shipment_ids: Sequence,
    pub(crate) run_ids: Sequence,
    pub(crate) invoice_ids: Sequence,
    pub(crate) payment_ids: Sequence,
    pub(crate) incident_ids: Sequence,
    pub(crate) complaint_ids: Sequence,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn account(&self, client: ClientId) -> Result<Arc<ClientAccount>, DispatchError> {
        self.clients
            .get(&client)
            .map(|a| a.value().clone())
            .ok_or(DispatchError::not_found("client", client.0))
    }

    pub(crate) fn destination(&self, id: DestinationId) -> Result<Destination, DispatchError> {
        self.destinations
            .get(&id)
            .map(|d| d.clone())
            .ok_or(DispatchError::not_found("destination", id.0))
    }

    pub fn shipment(&self, id: ShipmentId) -> Result<Shipment, DispatchError> {
        self.shipments
            .get(&id)
            .map(|s| s.clone())
            .ok_or(DispatchError::not_found("shipment", id.0))
    }

    pub fn run(&self, id: RunId) -> Result<Run, DispatchError> {
        self.runs
            .get(&id)
            .map(|r| r.clone())
            .ok_or(DispatchError::not_found("run", id.0))
    }

    pub fn invoice(&self, id: InvoiceId) -> Result<Invoice, DispatchError> {
        self.invoices
            .get(&id)
            .map(|i| i.clone())
            .ok_or(DispatchError::not_found("invoice", id.0))
    }

    pub fn payment(&self, id: PaymentId) -> Result<Payment, DispatchError> {
        self.payments
            .get(&id)
            .map(|p| p.clone())
            .ok_or(DispatchError::not_found("payment", id.0))
    }

    pub fn incident(&self, id: IncidentId) -> Result<Incident, DispatchError> {
        self.incidents
            .get(&id)
            .map(|i| i.clone())
            .ok_or(DispatchError::not_found("incident", id.0))
    }

    pub fn complaint(&self, id: ComplaintId) -> Result<Complaint, DispatchError> {
        self.complaints
            .get(&id)
            .map(|c| c.clone())
            .ok_or(DispatchError::not_found("complaint", id.0))
    }

    pub fn tracking(&self) -> &TrackingLog {
        &self.tracking
    }

    /// Invoices billing `shipment`, oldest first.
    pub fn invoices_for_shipment(&self, shipment: ShipmentId) -> Vec<Invoice> {
        let mut invoices: Vec<Invoice> = self
            .invoices
            .iter()
            .filter(|i| i.bills(shipment))
            .map(|i| i.clone())
            .collect();
        invoices.sort_by_key(|i| i.id);
        invoices
    }

    pub fn invoices_for_client(&self, client: ClientId) -> Vec<Invoice> {
        let mut invoices: Vec<Invoice> = self
            .invoices
            .iter()
            .filter(|i| i.client == client)
            .map(|i| i.clone())
            .collect();
        invoices.sort_by_key(|i| i.id);
        invoices
    }

    pub fn payments_for_invoice(&self, invoice: InvoiceId) -> Vec<Payment> {
        let mut payments: Vec<Payment> = self
            .payments
            .iter()
            .filter(|p| p.invoice == invoice)
            .map(|p| p.clone())
            .collect();
        payments.sort_by_key(|p| p.id);
        payments
    }

    /// Takes a shipment off its run and frees the run capacity. Returns the
    /// run it left, if any.
    pub(crate) fn unlink_shipment(&self, id: ShipmentId) -> Result<Option<RunId>, DispatchError> {
        let shipment = self.shipment(id)?;
        let Some(run_id) = shipment.run else {
            return Ok(None);
        };
        let run = self.runs.get_mut(&run_id);
        if let Some(mut s) = self.shipments.get_mut(&id) {
            s.run = None;
            s.expected_delivery = None;
        }
        if let Some(mut run) = run {
            run.unload(id, shipment.weight_kg, shipment.volume_m3);
        }
        tracing::debug!(shipment = %id, run = %run_id, "shipment unlinked from run");
        Ok(Some(run_id))
    }

    /// Runs sorted by id.
    pub fn runs(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = self.runs.iter().map(|r| r.clone()).collect();
        runs.sort_by_key(|r| r.id);
        runs
    }

    pub fn shipments(&self) -> Vec<Shipment> {
        let mut shipments: Vec<Shipment> = self.shipments.iter().map(|s| s.clone()).collect();
        shipments.sort_by_key(|s| s.id);
        shipments
    }
}

/// Handles shared by every component.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<Store>,
    pub registry: Arc<ResourceRegistry>,
    pub tariffs: Arc<dyn TariffBook>,
    pub notifications: Arc<NotificationCenter>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
}

impl Context {
    pub fn new(tariffs: Arc<dyn TariffBook>, clock: Arc<dyn Clock>, config: Config) -> Self {
        Self {
            store: Arc::new(Store::new()),
            registry: Arc::new(ResourceRegistry::new()),
            tariffs,
            notifications: Arc::new(NotificationCenter::new()),
            clock,
            config: Arc::new(config),
        }
    }
}
