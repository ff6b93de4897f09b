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

//! Twice-daily sweeps. An external scheduler decides when they run; what
//! they start, mark and flag is decided here. Both read the time from the
//! engine clock and can be repeated without side effects piling up.

use crate::base::{InvoiceId, NotificationId, RunId, ShipmentId, VehicleId};
use crate::billing::Billing;
use crate::dispatch::DispatchEngine;
use crate::error::DispatchError;
use crate::notification::{NewNotification, NotificationKind, Subject};
use crate::store::Context;
use chrono::Duration;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub started_runs: Vec<RunId>,
    pub flagged_runs: Vec<RunId>,
    pub overdue_invoices: Vec<InvoiceId>,
    pub maintenance_due: Vec<VehicleId>,
    pub maintenance_returns: Vec<VehicleId>,
    pub maintenance_conflicts: Vec<VehicleId>,
    pub redispatched: Vec<ShipmentId>,
    pub unassigned: Vec<ShipmentId>,
    pub resurfaced: usize,
    pub notifications: Vec<NotificationId>,
}

#[derive(Clone)]
pub struct Sweeper {
    ctx: Context,
    dispatch: DispatchEngine,
    billing: Billing,
}

impl Sweeper {
    pub fn new(ctx: Context, dispatch: DispatchEngine, billing: Billing) -> Self {
        Self {
            ctx,
            dispatch,
            billing,
        }
    }

    /// Starts due runs, marks overdue invoices, asks for maintenance returns,
    /// retries unassigned shipments and re-surfaces deferred notifications.
    pub fn morning_sweep(&self) -> Result<SweepReport, DispatchError> {
        let now = self.ctx.clock.now();
        let today = now.date();
        let mut report = SweepReport::default();

        let due = self.dispatch.start_due_runs()?;
        report.started_runs = due.started.iter().map(|t| t.run).collect();
        report.flagged_runs = due.flagged;

        report.overdue_invoices = self.billing.mark_overdue_invoices(today);

        for vehicle in self.ctx.registry.maintenance_due_back(today) {
            let id = self.ctx.notifications.raise(
                NewNotification::new(
                    NotificationKind::MaintenanceReturnDue,
                    Subject::Vehicle(vehicle),
                    format!("vehicle {vehicle} is expected back from maintenance"),
                ),
                now,
            );
            report.maintenance_returns.push(vehicle);
            report.notifications.push(id);
        }

        let retry = self.dispatch.retry_unassigned()?;
        report.redispatched = retry.placed.iter().map(|p| p.assignment.shipment).collect();
        report.unassigned = retry.waiting;

        report.resurfaced = self.ctx.notifications.resurface_read();

        tracing::info!(
            started = report.started_runs.len(),
            flagged = report.flagged_runs.len(),
            overdue = report.overdue_invoices.len(),
            returns = report.maintenance_returns.len(),
            redispatched = report.redispatched.len(),
            "morning sweep done"
        );
        Ok(report)
    }

    /// Announces tomorrow's maintenance and flags vehicles still committed
    /// to a run.
    pub fn evening_sweep(&self) -> Result<SweepReport, DispatchError> {
        let now = self.ctx.clock.now();
        let tomorrow = now.date() + Duration::days(1);
        let mut report = SweepReport::default();

        for vehicle in self.ctx.registry.maintenance_starting_on(tomorrow) {
            let id = self.ctx.notifications.raise(
                NewNotification::new(
                    NotificationKind::MaintenanceDue,
                    Subject::Vehicle(vehicle.id),
                    format!("vehicle {} ({}) goes to maintenance tomorrow", vehicle.id, vehicle.plate),
                ),
                now,
            );
            report.maintenance_due.push(vehicle.id);
            report.notifications.push(id);

            let held_by_active_run = vehicle
                .run
                .and_then(|run| self.ctx.store.run(run).ok())
                .is_some_and(|run| run.status.is_active());
            if held_by_active_run {
                let id = self.ctx.notifications.raise(
                    NewNotification::new(
                        NotificationKind::MaintenanceConflict,
                        Subject::Vehicle(vehicle.id),
                        format!("vehicle {} is committed to a run on its maintenance day", vehicle.id),
                    ),
                    now,
                );
                tracing::warn!(vehicle = %vehicle.id, "maintenance conflicts with a planned run");
                report.maintenance_conflicts.push(vehicle.id);
                report.notifications.push(id);
            }
        }

        tracing::info!(
            due = report.maintenance_due.len(),
            conflicts = report.maintenance_conflicts.len(),
            "evening sweep done"
        );
        Ok(report)
    }
}
