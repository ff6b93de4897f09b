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

//! Shipment dispatch and run lifecycle.
//!
//! # Assignment
//!
//! - **Express** shipments ride a dedicated (private) run. An empty private
//!   run still planned and not yet due is reused; otherwise one is created
//!   departing after the configured lead time, or first thing tomorrow past
//!   the cutoff hour.
//! - **Standard / International** shipments go to the first shared planned run
//!   of their zone (earliest departure, then lowest id) whose load plus the
//!   shipment weight stays within the vehicle capacity. Without one, a new
//!   shared run departs `today + zone offset` at the shared departure hour.
//!
//! Creating a run reserves a driver/vehicle pair. When none is free, the pair
//! of an abandoned run (planned, empty, and either automatic or past its
//! departure) is reclaimed first. When none can be reserved the shipment
//! stays persisted and unassigned.
//!
//! # Run transitions
//!
//! `Planned → InProgress → Completed`, one step at a time. Requesting the
//! current status again is a no-op, so a sweep may safely repeat itself.

use crate::base::{RunId, ShipmentId};
use crate::billing::{Billed, Billing};
use crate::error::DispatchError;
use crate::notification::{NewNotification, NotificationKind, Subject};
use crate::run::{Run, RunOrigin, RunPlan, RunStatus, RunStep, trip_consumption};
use crate::shipment::{Shipment, ShipmentRequest, ShipmentStatus};
use crate::store::Context;
use crate::tariff::{ServiceTier, Zone, delivery_delay_days};
use crate::tracking::TrackingKind;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::Serialize;

/// Result of placing a shipment on a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub shipment: ShipmentId,
    pub run: RunId,
    /// The run was created for this shipment.
    pub run_created: bool,
    pub departure: NaiveDateTime,
    pub expected_delivery: NaiveDate,
}

/// Result of a run status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunTransition {
    pub run: RunId,
    pub from: RunStatus,
    pub to: RunStatus,
    /// Shipments whose status moved with the run. On departure these are the
    /// recipients to notify.
    pub moved: Vec<ShipmentId>,
    pub distance_km: Option<Decimal>,
    pub fuel_litres: Option<Decimal>,
}

impl RunTransition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Outcome of the auto-start pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DueRuns {
    pub started: Vec<RunTransition>,
    /// Due but empty; left planned for an operator.
    pub flagged: Vec<RunId>,
}

/// What [`DispatchEngine::create_shipment`] did with a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShipmentReceipt {
    pub shipment: ShipmentId,
    pub amount: Decimal,
    pub billed: Billed,
    /// `None` when no driver/vehicle pair was free; the shipment waits for a
    /// retry.
    pub assignment: Option<Assignment>,
}

/// A shipment placed again, and billed if a reshipment still owed its line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redispatch {
    pub assignment: Assignment,
    pub billed: Option<Billed>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub placed: Vec<Redispatch>,
    pub waiting: Vec<ShipmentId>,
}

enum Attach {
    Loaded(Assignment),
    Rejected,
}

#[derive(Clone)]
pub struct DispatchEngine {
    ctx: Context,
    billing: Billing,
}

impl DispatchEngine {
    pub fn new(ctx: Context, billing: Billing) -> Self {
        Self { ctx, billing }
    }

    /// Full intake of a shipment: register, bill, then assign.
    ///
    /// A missing driver/vehicle pair does not fail the intake. The shipment
    /// stays billed and unassigned and an operator is notified.
    pub fn create_shipment(&self, request: ShipmentRequest) -> Result<ShipmentReceipt, DispatchError> {
        let id = self.register_shipment(request)?;
        let billed = self.billing.bill_shipment(id)?;
        let amount = self.ctx.store.shipment(id)?.amount;
        let assignment = match self.assign_shipment(id) {
            Ok(assignment) => Some(assignment),
            Err(DispatchError::NoResourceAvailable) => {
                self.flag_unassigned(id);
                None
            }
            Err(e) => return Err(e),
        };
        Ok(ShipmentReceipt {
            shipment: id,
            amount,
            billed,
            assignment,
        })
    }

    /// Assigns a waiting shipment and bills it if it was reshipped and not
    /// billed since.
    pub fn redispatch(&self, id: ShipmentId) -> Result<Redispatch, DispatchError> {
        let assignment = self.assign_shipment(id)?;
        let billed = if self.ctx.store.shipment(id)?.rebill_pending {
            Some(self.billing.bill_shipment(id)?)
        } else {
            None
        };
        Ok(Redispatch { assignment, billed })
    }

    /// Tries every waiting shipment again, oldest first.
    pub fn retry_unassigned(&self) -> Result<RetryReport, DispatchError> {
        let mut report = RetryReport::default();
        for id in self.unassigned_shipments() {
            match self.redispatch(id) {
                Ok(placed) => report.placed.push(placed),
                Err(DispatchError::NoResourceAvailable) => {
                    self.flag_unassigned(id);
                    report.waiting.push(id);
                }
                Err(e) => return Err(e),
            }
        }
        if !report.placed.is_empty() || !report.waiting.is_empty() {
            tracing::info!(placed = report.placed.len(), waiting = report.waiting.len(), "unassigned shipments retried");
        }
        Ok(report)
    }

    pub(crate) fn flag_unassigned(&self, id: ShipmentId) {
        tracing::warn!(shipment = %id, "no driver/vehicle pair available, shipment left unassigned");
        self.ctx.notifications.raise(
            NewNotification::new(
                NotificationKind::UnassignedShipment,
                Subject::Shipment(id),
                format!("shipment {id} is waiting for a free driver and vehicle"),
            ),
            self.ctx.clock.now(),
        );
    }

    /// Validates, prices and persists a new shipment as `Pending`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Validation`] - non-positive weight or negative volume.
    /// - [`DispatchError::NotFound`] - unknown client or destination.
    /// - [`DispatchError::NoTariff`] - nothing priced for destination and tier.
    pub fn register_shipment(&self, request: ShipmentRequest) -> Result<ShipmentId, DispatchError> {
        request.validate()?;
        let store = &self.ctx.store;
        store.account(request.client)?;
        store.destination(request.destination)?;
        let tariff = self
            .ctx
            .tariffs
            .lookup(request.destination, request.tier)
            .ok_or(DispatchError::NoTariff {
                destination: request.destination,
                tier: request.tier,
            })?;
        let amount = tariff.price(request.weight_kg, request.volume_m3);

        let now = self.ctx.clock.now();
        let id = ShipmentId(store.shipment_ids.next());
        let shipment = Shipment::new(id, request, amount, now);
        tracing::info!(shipment = %id, client = %shipment.client, tier = %shipment.tier, %amount, "shipment registered");
        store.shipments.insert(id, shipment);
        store
            .tracking
            .append(id, now, TrackingKind::Created, "shipment created");
        Ok(id)
    }

    /// Places an unassigned shipment on a run, creating one when needed.
    ///
    /// Calling it for a shipment that already rides a run returns that
    /// assignment unchanged.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NoResourceAvailable`] - a run was needed but no
    ///   driver/vehicle pair could be reserved. The shipment stays unassigned.
    /// - [`DispatchError::InvalidTransition`] - the shipment is not awaiting
    ///   departure (delivered, cancelled, ...).
    pub fn assign_shipment(&self, id: ShipmentId) -> Result<Assignment, DispatchError> {
        let shipment = self.ctx.store.shipment(id)?;
        if let Some(run) = shipment.run {
            return self.existing_assignment(&shipment, run);
        }
        if !shipment.status.is_awaiting_departure() {
            return Err(DispatchError::InvalidTransition {
                entity: "shipment",
                from: shipment.status.as_str(),
                to: ShipmentStatus::Pending.as_str(),
            });
        }

        let destination = self.ctx.store.destination(shipment.destination)?;
        let delay = delivery_delay_days(
            &destination,
            shipment.tier,
            self.ctx.config.express_distance_band_km,
        );
        let now = self.ctx.clock.now();

        let candidates = match shipment.tier {
            ServiceTier::Express => self.reusable_private_runs(now),
            ServiceTier::Standard | ServiceTier::International => {
                self.shared_candidates(destination.zone, now)
            }
        };
        for run in candidates {
            if let Attach::Loaded(assignment) = self.attach(run, &shipment, delay)? {
                return Ok(assignment);
            }
        }

        let (departure, private) = match shipment.tier {
            ServiceTier::Express => (self.express_departure(now), true),
            ServiceTier::Standard | ServiceTier::International => {
                (self.shared_departure(destination.zone, now), false)
            }
        };
        match self.spawn_run(destination.zone, departure, private, &shipment, delay)? {
            Attach::Loaded(assignment) => Ok(assignment),
            Attach::Rejected => {
                let current = self.ctx.store.shipment(id)?;
                match current.run {
                    Some(held) => self.existing_assignment(&current, held),
                    None => Err(DispatchError::NoResourceAvailable),
                }
            }
        }
    }

    /// Creates a run chosen by an operator and reserves its pair.
    ///
    /// # Errors
    ///
    /// [`DispatchError::ResourceUnavailable`] if the driver or vehicle is
    /// already held or otherwise unavailable.
    pub fn create_run(&self, plan: RunPlan) -> Result<RunId, DispatchError> {
        let vehicle = self
            .ctx
            .registry
            .vehicle(plan.vehicle)
            .ok_or(DispatchError::not_found("vehicle", plan.vehicle.0))?;
        let id = RunId(self.ctx.store.run_ids.next());
        self.ctx.registry.reserve(plan.driver, plan.vehicle, id)?;
        tracing::info!(run = %id, zone = ?plan.zone, departure = %plan.departure, "run created by operator");
        self.ctx.store.runs.insert(
            id,
            Run::new(id, plan, vehicle.capacity_kg, RunOrigin::Manual),
        );
        Ok(id)
    }

    pub fn record_arrival_odometer(&self, run: RunId, km: Decimal) -> Result<(), DispatchError> {
        if km < Decimal::ZERO {
            return Err(DispatchError::Validation("odometer cannot be negative".into()));
        }
        let mut entry = self
            .ctx
            .store
            .runs
            .get_mut(&run)
            .ok_or(DispatchError::not_found("run", run.0))?;
        if entry.status != RunStatus::InProgress {
            return Err(DispatchError::Validation(format!(
                "arrival odometer can only be recorded on a run in progress, {run} is {}",
                entry.status.as_str()
            )));
        }
        entry.arrival_odometer = Some(km);
        Ok(())
    }

    /// Moves a run one step forward and cascades to its shipments and
    /// resources.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidTransition`] - skipping or reversing a step.
    /// - [`DispatchError::Validation`] - departing without shipments, or
    ///   completing without an arrival odometer reading.
    /// - [`DispatchError::InvalidOdometer`] - arrival below departure reading.
    pub fn advance_run(&self, id: RunId, to: RunStatus) -> Result<RunTransition, DispatchError> {
        let store = &self.ctx.store;
        let mut run = store
            .runs
            .get_mut(&id)
            .ok_or(DispatchError::not_found("run", id.0))?;
        let from = run.status;

        match from.step_to(to)? {
            RunStep::Unchanged => Ok(RunTransition {
                run: id,
                from,
                to: from,
                moved: Vec::new(),
                distance_km: run.distance_km,
                fuel_litres: run.fuel_litres,
            }),
            RunStep::Depart => {
                if !run.can_start() {
                    return Err(DispatchError::Validation(format!(
                        "run {id} has no shipments and cannot depart"
                    )));
                }
                let vehicle = self
                    .ctx
                    .registry
                    .vehicle(run.vehicle)
                    .ok_or(DispatchError::not_found("vehicle", run.vehicle.0))?;
                self.ctx.registry.mark_on_run(run.driver, run.vehicle, id)?;

                let now = self.ctx.clock.now();
                let mut moved = Vec::new();
                for shipment_id in run.shipments.clone() {
                    let Some(mut shipment) = store.shipments.get_mut(&shipment_id) else {
                        continue;
                    };
                    if shipment.status.is_awaiting_departure() {
                        shipment.status = shipment.status.transition(ShipmentStatus::InTransit)?;
                        store.tracking.append(
                            shipment_id,
                            now,
                            TrackingKind::InTransit { run: id },
                            "left the hub",
                        );
                        moved.push(shipment_id);
                    }
                }
                run.departure_odometer = Some(vehicle.odometer_km);
                run.status = RunStatus::InProgress;
                tracing::info!(run = %id, shipments = moved.len(), "run departed");
                Ok(RunTransition {
                    run: id,
                    from,
                    to,
                    moved,
                    distance_km: None,
                    fuel_litres: None,
                })
            }
            RunStep::Complete => {
                let vehicle = self
                    .ctx
                    .registry
                    .vehicle(run.vehicle)
                    .ok_or(DispatchError::not_found("vehicle", run.vehicle.0))?;
                let arrival = run.arrival_odometer.ok_or_else(|| {
                    DispatchError::Validation(format!("run {id} has no arrival odometer"))
                })?;
                let departure = run.departure_odometer.unwrap_or(vehicle.odometer_km);
                let (distance, fuel) =
                    trip_consumption(departure, arrival, vehicle.avg_consumption)?;

                self.ctx.registry.release(run.driver, run.vehicle, id)?;
                self.ctx.registry.set_odometer(run.vehicle, arrival)?;

                let now = self.ctx.clock.now();
                let mut moved = Vec::new();
                for shipment_id in run.shipments.clone() {
                    let Some(mut shipment) = store.shipments.get_mut(&shipment_id) else {
                        continue;
                    };
                    if shipment.status == ShipmentStatus::InTransit {
                        shipment.status = ShipmentStatus::Delivered;
                        shipment.delivered_at = Some(now);
                        store.tracking.append(
                            shipment_id,
                            now,
                            TrackingKind::Delivered { run: id },
                            "delivered",
                        );
                        moved.push(shipment_id);
                    }
                }
                run.status = RunStatus::Completed;
                run.returned_at = Some(now);
                run.distance_km = Some(distance);
                run.fuel_litres = Some(fuel);
                tracing::info!(run = %id, %distance, %fuel, delivered = moved.len(), "run completed");
                Ok(RunTransition {
                    run: id,
                    from,
                    to,
                    moved,
                    distance_km: Some(distance),
                    fuel_litres: Some(fuel),
                })
            }
        }
    }

    /// Starts every planned run whose departure time has passed. Empty ones
    /// stay planned and are flagged to an operator once.
    pub fn start_due_runs(&self) -> Result<DueRuns, DispatchError> {
        let now = self.ctx.clock.now();
        let mut due: Vec<(NaiveDateTime, RunId, bool)> = self
            .ctx
            .store
            .runs
            .iter()
            .filter(|r| r.status == RunStatus::Planned && r.departure <= now)
            .map(|r| (r.departure, r.id, r.can_start()))
            .collect();
        due.sort();

        let mut report = DueRuns::default();
        for (_, run, can_start) in due {
            if can_start {
                report.started.push(self.advance_run(run, RunStatus::InProgress)?);
            } else {
                self.ctx.notifications.raise(
                    NewNotification::new(
                        NotificationKind::RunWithoutShipments,
                        Subject::Run(run),
                        format!("run {run} is due but carries no shipment"),
                    ),
                    now,
                );
                tracing::warn!(%run, "due run left planned: no shipments");
                report.flagged.push(run);
            }
        }
        Ok(report)
    }

    /// Drops a planned run that carries no shipment and gives its driver and
    /// vehicle back.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidTransition`] - the run already departed.
    /// - [`DispatchError::Validation`] - shipments are still on board.
    pub fn discard_empty_run(&self, id: RunId) -> Result<(), DispatchError> {
        let store = &self.ctx.store;
        let removed = store.runs.remove_if(&id, |_, run| {
            run.status == RunStatus::Planned && run.shipments.is_empty()
        });
        let Some((_, run)) = removed else {
            let run = store.run(id)?;
            if run.status != RunStatus::Planned {
                return Err(DispatchError::InvalidTransition {
                    entity: "run",
                    from: run.status.as_str(),
                    to: "DISCARDED",
                });
            }
            return Err(DispatchError::Validation(format!(
                "run {id} still carries {} shipment(s)",
                run.shipments.len()
            )));
        };
        self.ctx.registry.release(run.driver, run.vehicle, id)?;
        tracing::info!(run = %id, driver = %run.driver, vehicle = %run.vehicle, "empty run discarded");
        Ok(())
    }

    /// Shipments waiting for a run, oldest first.
    pub fn unassigned_shipments(&self) -> Vec<ShipmentId> {
        let mut waiting: Vec<ShipmentId> = self
            .ctx
            .store
            .shipments
            .iter()
            .filter(|s| s.is_unassigned())
            .map(|s| s.id)
            .collect();
        waiting.sort();
        waiting
    }

    fn existing_assignment(
        &self,
        shipment: &Shipment,
        run: RunId,
    ) -> Result<Assignment, DispatchError> {
        let run = self.ctx.store.run(run)?;
        Ok(Assignment {
            shipment: shipment.id,
            run: run.id,
            run_created: false,
            departure: run.departure,
            expected_delivery: shipment
                .expected_delivery
                .unwrap_or_else(|| run.departure.date()),
        })
    }

    /// Shared planned runs of `zone` not yet departed, earliest first.
    fn shared_candidates(&self, zone: Zone, now: NaiveDateTime) -> Vec<RunId> {
        let mut runs: Vec<(NaiveDateTime, RunId)> = self
            .ctx
            .store
            .runs
            .iter()
            .filter(|r| r.accepts_shared(zone, now))
            .map(|r| (r.departure, r.id))
            .collect();
        runs.sort();
        runs.into_iter().map(|(_, id)| id).collect()
    }

    /// Empty dedicated runs still planned and not yet due, earliest first.
    fn reusable_private_runs(&self, now: NaiveDateTime) -> Vec<RunId> {
        let mut runs: Vec<(NaiveDateTime, RunId)> = self
            .ctx
            .store
            .runs
            .iter()
            .filter(|r| {
                r.private
                    && r.status == RunStatus::Planned
                    && r.shipments.is_empty()
                    && r.departure >= now
            })
            .map(|r| (r.departure, r.id))
            .collect();
        runs.sort();
        runs.into_iter().map(|(_, id)| id).collect()
    }

    /// Loads the shipment on `run_id` if the run still qualifies.
    fn attach(
        &self,
        run_id: RunId,
        shipment: &Shipment,
        delay_days: i64,
    ) -> Result<Attach, DispatchError> {
        let Some(mut run) = self.ctx.store.runs.get_mut(&run_id) else {
            return Ok(Attach::Rejected);
        };
        self.load_onto(run.value_mut(), shipment, delay_days, false)
    }

    /// Loads the shipment on a run whose entry the caller holds, so capacity
    /// and the shipment's own assignment are checked and written together.
    fn load_onto(
        &self,
        run: &mut Run,
        shipment: &Shipment,
        delay_days: i64,
        created: bool,
    ) -> Result<Attach, DispatchError> {
        let store = &self.ctx.store;
        if run.status != RunStatus::Planned {
            return Ok(Attach::Rejected);
        }
        if run.private {
            if !run.shipments.is_empty() {
                return Ok(Attach::Rejected);
            }
        } else if !run.fits(shipment.weight_kg) {
            return Ok(Attach::Rejected);
        }

        let mut current = store
            .shipments
            .get_mut(&shipment.id)
            .ok_or(DispatchError::not_found("shipment", shipment.id.0))?;
        if current.run.is_some() || !current.status.is_awaiting_departure() {
            return Ok(Attach::Rejected);
        }

        let expected_delivery = run.departure.date() + Duration::days(delay_days);
        run.load(shipment.id, shipment.weight_kg, shipment.volume_m3);
        current.run = Some(run.id);
        current.expected_delivery = Some(expected_delivery);
        store.tracking.append(
            shipment.id,
            self.ctx.clock.now(),
            TrackingKind::AssignedToRun { run: run.id },
            format!("assigned to run {}", run.id),
        );
        tracing::info!(shipment = %shipment.id, run = %run.id, created, "shipment assigned");

        Ok(Attach::Loaded(Assignment {
            shipment: shipment.id,
            run: run.id,
            run_created: created,
            departure: run.departure,
            expected_delivery,
        }))
    }

    /// Reserves a pair for a new run and inserts the run with the shipment
    /// already on board. The run is never visible empty to other callers.
    fn spawn_run(
        &self,
        zone: Zone,
        departure: NaiveDateTime,
        private: bool,
        shipment: &Shipment,
        delay_days: i64,
    ) -> Result<Attach, DispatchError> {
        let id = RunId(self.ctx.store.run_ids.next());
        let (driver, vehicle) = match self.ctx.registry.reserve_any(shipment.weight_kg, id) {
            Err(DispatchError::NoResourceAvailable) if self.reclaim_idle_pair()? => {
                self.ctx.registry.reserve_any(shipment.weight_kg, id)?
            }
            reserved => reserved?,
        };
        let Some(capacity_kg) = self.ctx.registry.vehicle(vehicle).map(|v| v.capacity_kg) else {
            self.ctx.registry.release(driver, vehicle, id)?;
            return Err(DispatchError::not_found("vehicle", vehicle.0));
        };
        let plan = RunPlan {
            zone,
            driver,
            vehicle,
            departure,
            private,
        };
        tracing::info!(run = %id, ?zone, %departure, private, "run created");

        let attached = {
            let mut run = self
                .ctx
                .store
                .runs
                .entry(id)
                .or_insert(Run::new(id, plan, capacity_kg, RunOrigin::Automatic));
            self.load_onto(run.value_mut(), shipment, delay_days, true)
        };
        match attached {
            Ok(Attach::Loaded(assignment)) => Ok(Attach::Loaded(assignment)),
            Ok(Attach::Rejected) => {
                // Shipment was placed concurrently; give the pair back.
                self.discard_run(id)?;
                Ok(Attach::Rejected)
            }
            Err(e) => {
                self.discard_run(id)?;
                Err(e)
            }
        }
    }

    /// Discards the first abandoned run it can and clears its flag. Operator
    /// runs still ahead of their departure are left alone.
    fn reclaim_idle_pair(&self) -> Result<bool, DispatchError> {
        let now = self.ctx.clock.now();
        let mut idle: Vec<(NaiveDateTime, RunId)> = self
            .ctx
            .store
            .runs
            .iter()
            .filter(|r| {
                r.status == RunStatus::Planned
                    && r.shipments.is_empty()
                    && (r.origin == RunOrigin::Automatic || r.departure <= now)
            })
            .map(|r| (r.departure, r.id))
            .collect();
        idle.sort();

        for (_, run) in idle {
            if self.discard_empty_run(run).is_err() {
                // Loaded or discarded concurrently.
                continue;
            }
            let flag = self
                .ctx
                .notifications
                .find_open(NotificationKind::RunWithoutShipments, Subject::Run(run));
            if let Some(flag) = flag {
                self.ctx.notifications.mark_processed(flag)?;
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn discard_run(&self, id: RunId) -> Result<(), DispatchError> {
        if let Some((_, run)) = self.ctx.store.runs.remove(&id) {
            self.ctx.registry.release(run.driver, run.vehicle, id)?;
        }
        Ok(())
    }

    fn express_departure(&self, now: NaiveDateTime) -> NaiveDateTime {
        let config = &self.ctx.config;
        let lead = now + Duration::minutes(config.express_lead_minutes);
        if now.time() < at_hour(config.express_cutoff_hour) {
            lead
        } else {
            (now.date() + Duration::days(1)).and_time(at_hour(config.first_departure_hour))
        }
    }

    fn shared_departure(&self, zone: Zone, now: NaiveDateTime) -> NaiveDateTime {
        (now.date() + Duration::days(zone.departure_offset_days()))
            .and_time(at_hour(self.ctx.config.shared_departure_hour))
    }
}

fn at_hour(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN)
}
