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

//! Back office engine.
//!
//! The [`Engine`] wires the components around one shared [`Context`] and
//! exposes the reference data operations (clients, destinations, tariffs,
//! fleet) the components read from.
//!
//! # Components
//!
//! - [`DispatchEngine`]: shipment intake, run assignment and run lifecycle.
//! - [`Billing`]: invoices, payments and balance audit.
//! - [`Resolution`]: incidents and complaints with their cascades.
//! - [`Workflow`]: operator actions on notifications.
//! - [`Sweeper`]: morning and evening sweeps.
//!
//! # Thread Safety
//!
//! Every table is a [`dashmap::DashMap`] and each client account carries its
//! own lock, so the engine can be shared across threads behind an [`Arc`] and
//! operations on different clients run in parallel.

use crate::base::{ClientId, DestinationId, DriverId, VehicleId};
use crate::billing::Billing;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::dispatch::{DispatchEngine, ShipmentReceipt};
use crate::error::DispatchError;
use crate::ledger::{Client, ClientAccount};
use crate::notification::NotificationCenter;
use crate::resolution::Resolution;
use crate::resource::{ResourceRegistry, VehicleSpec};
use crate::shipment::ShipmentRequest;
use crate::store::{Context, Store};
use crate::sweep::Sweeper;
use crate::tariff::{Destination, InMemoryTariffBook, ServiceTier, Tariff, Zone};
use crate::workflow::Workflow;
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct Engine {
    ctx: Context,
    tariffs: Arc<InMemoryTariffBook>,
    dispatch: DispatchEngine,
    billing: Billing,
    resolution: Resolution,
    workflow: Workflow,
    sweeper: Sweeper,
}

impl Engine {
    /// Creates an empty engine reading time from `clock`.
    pub fn new(config: Config, clock: Arc<dyn Clock>) -> Self {
        let tariffs = Arc::new(InMemoryTariffBook::new());
        let ctx = Context::new(tariffs.clone(), clock, config);
        let billing = Billing::new(ctx.clone());
        let dispatch = DispatchEngine::new(ctx.clone(), billing.clone());
        let resolution = Resolution::new(ctx.clone(), dispatch.clone(), billing.clone());
        let workflow = Workflow::new(ctx.clone(), dispatch.clone(), resolution.clone());
        let sweeper = Sweeper::new(ctx.clone(), dispatch.clone(), billing.clone());
        Engine {
            ctx,
            tariffs,
            dispatch,
            billing,
            resolution,
            workflow,
            sweeper,
        }
    }

    /// Engine on the local wall clock.
    pub fn with_system_clock(config: Config) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    pub fn register_client(
        &self,
        name: impl Into<String>,
        email: Option<String>,
        phone: Option<String>,
    ) -> Result<ClientId, DispatchError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DispatchError::Validation("client name is empty".into()));
        }
        let id = ClientId(self.ctx.store.client_ids.next());
        let client = Client {
            id,
            name,
            email,
            phone,
        };
        tracing::debug!(client = %id, name = %client.name, "client registered");
        self.ctx
            .store
            .clients
            .insert(id, Arc::new(ClientAccount::new(client)));
        Ok(id)
    }

    pub fn register_destination(
        &self,
        name: impl Into<String>,
        zone: Zone,
        delay_days: i64,
        distance_km: Decimal,
    ) -> Result<DestinationId, DispatchError> {
        if delay_days < 0 || distance_km < Decimal::ZERO {
            return Err(DispatchError::Validation(
                "destination delay and distance cannot be negative".into(),
            ));
        }
        let id = DestinationId(self.ctx.store.destination_ids.next());
        self.ctx.store.destinations.insert(
            id,
            Destination {
                id,
                name: name.into(),
                zone,
                delay_days,
                distance_km,
            },
        );
        Ok(id)
    }

    pub fn set_tariff(
        &self,
        destination: DestinationId,
        tier: ServiceTier,
        tariff: Tariff,
    ) -> Result<(), DispatchError> {
        self.ctx.store.destination(destination)?;
        if tariff.base < Decimal::ZERO || tariff.per_kg < Decimal::ZERO || tariff.per_m3 < Decimal::ZERO
        {
            return Err(DispatchError::Validation("tariff rates cannot be negative".into()));
        }
        self.tariffs.set(destination, tier, tariff);
        Ok(())
    }

    pub fn register_driver(&self, name: impl Into<String>) -> DriverId {
        self.ctx.registry.register_driver(name)
    }

    pub fn register_vehicle(&self, spec: VehicleSpec) -> Result<VehicleId, DispatchError> {
        self.ctx.registry.register_vehicle(spec)
    }

    /// Register, bill and assign a shipment in one call.
    pub fn create_shipment(&self, request: ShipmentRequest) -> Result<ShipmentReceipt, DispatchError> {
        self.dispatch.create_shipment(request)
    }

    pub fn account(&self, client: ClientId) -> Option<Arc<ClientAccount>> {
        self.ctx.store.account(client).ok()
    }

    /// Client accounts ordered by id.
    pub fn accounts(&self) -> Vec<Arc<ClientAccount>> {
        let mut accounts: Vec<(ClientId, Arc<ClientAccount>)> = self
            .ctx
            .store
            .clients
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        accounts.sort_by_key(|(id, _)| *id);
        accounts.into_iter().map(|(_, account)| account).collect()
    }

    pub fn dispatch(&self) -> &DispatchEngine {
        &self.dispatch
    }

    pub fn billing(&self) -> &Billing {
        &self.billing
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn sweeper(&self) -> &Sweeper {
        &self.sweeper
    }

    pub fn store(&self) -> &Store {
        &self.ctx.store
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.ctx.registry
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.ctx.notifications
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_system_clock(Config::default())
    }
}
