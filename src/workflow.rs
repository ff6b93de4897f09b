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

//! Operator decisions on notifications.
//!
//! [`Workflow::handle_action`] turns one `(kind, action)` pair into exactly
//! one call on another component:
//!
//! | Kind                                        | Action                     | Effect                     |
//! |---------------------------------------------|----------------------------|----------------------------|
//! | MaintenanceDue                              | ConfirmMaintenanceStart    | vehicle enters maintenance |
//! | MaintenanceReturnDue                        | ConfirmMaintenanceReturn   | vehicle available again    |
//! | ManualRefundRequired / CompensationApplied  | ConfirmRefund              | refund confirmed           |
//! | IncidentReported / ComplaintOpened          | Reassign(agent)            | agent assigned             |
//! | UnassignedShipment                          | RetryDispatch              | shipment dispatched again  |
//! | RunWithoutShipments                         | DiscardRun                 | run dropped, pair released |
//! | any                                         | Redirect                   | READ, subject returned     |
//! | any                                         | Defer                      | READ, re-surfaced later    |
//!
//! A handled action marks the notification PROCESSED. Any other pair is
//! ignored and leaves the status untouched.

use crate::base::{AgentId, IncidentId, NotificationId, RunId, VehicleId};
use crate::dispatch::{DispatchEngine, Redispatch};
use crate::error::DispatchError;
use crate::notification::{ActionKind, NotificationKind, Subject};
use crate::resolution::Resolution;
use crate::store::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decision submitted by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ConfirmMaintenanceStart,
    ConfirmMaintenanceReturn,
    ConfirmRefund,
    Reassign(AgentId),
    RetryDispatch,
    DiscardRun,
    Redirect,
    Defer,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::ConfirmMaintenanceStart => ActionKind::ConfirmMaintenanceStart,
            Action::ConfirmMaintenanceReturn => ActionKind::ConfirmMaintenanceReturn,
            Action::ConfirmRefund => ActionKind::ConfirmRefund,
            Action::Reassign(_) => ActionKind::Reassign,
            Action::RetryDispatch => ActionKind::RetryDispatch,
            Action::DiscardRun => ActionKind::DiscardRun,
            Action::Redirect => ActionKind::Redirect,
            Action::Defer => ActionKind::Defer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ActionOutcome {
    MaintenanceStarted(VehicleId),
    MaintenanceEnded(VehicleId),
    RefundConfirmed {
        incident: IncidentId,
        disbursed: Decimal,
    },
    AgentAssigned {
        subject: Subject,
        agent: AgentId,
    },
    Redispatched(Redispatch),
    RunDiscarded(RunId),
    /// The operator must complete this entity elsewhere.
    Redirected(Subject),
    Deferred,
    /// Pair not handled; nothing changed.
    Ignored,
}

#[derive(Clone)]
pub struct Workflow {
    ctx: Context,
    dispatch: DispatchEngine,
    resolution: Resolution,
}

impl Workflow {
    pub fn new(ctx: Context, dispatch: DispatchEngine, resolution: Resolution) -> Self {
        Self {
            ctx,
            dispatch,
            resolution,
        }
    }

    /// Applies an operator action to a notification.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::AlreadyProcessed`] - the notification is final.
    /// - Whatever the invoked operation fails with. The notification then
    ///   stays as it was so the operator can try again.
    pub fn handle_action(
        &self,
        id: NotificationId,
        action: Action,
    ) -> Result<ActionOutcome, DispatchError> {
        let notifications = &self.ctx.notifications;
        let notification = notifications.ensure_actionable(id)?;

        let outcome = match (notification.kind, action, notification.subject) {
            (
                NotificationKind::MaintenanceDue,
                Action::ConfirmMaintenanceStart,
                Subject::Vehicle(vehicle),
            ) => {
                self.ctx.registry.start_maintenance(vehicle)?;
                ActionOutcome::MaintenanceStarted(vehicle)
            }
            (
                NotificationKind::MaintenanceReturnDue,
                Action::ConfirmMaintenanceReturn,
                Subject::Vehicle(vehicle),
            ) => {
                self.ctx.registry.end_maintenance(vehicle)?;
                ActionOutcome::MaintenanceEnded(vehicle)
            }
            (
                NotificationKind::ManualRefundRequired | NotificationKind::CompensationApplied,
                Action::ConfirmRefund,
                Subject::Incident(incident),
            ) => {
                let disbursed = self.resolution.confirm_refund(incident)?;
                ActionOutcome::RefundConfirmed {
                    incident,
                    disbursed,
                }
            }
            (
                NotificationKind::IncidentReported,
                Action::Reassign(agent),
                subject @ Subject::Incident(incident),
            ) => {
                self.resolution.assign_incident_agent(incident, agent)?;
                ActionOutcome::AgentAssigned { subject, agent }
            }
            (
                NotificationKind::ComplaintOpened,
                Action::Reassign(agent),
                subject @ Subject::Complaint(complaint),
            ) => {
                self.resolution.assign_complaint_agent(complaint, agent)?;
                ActionOutcome::AgentAssigned { subject, agent }
            }
            (
                NotificationKind::UnassignedShipment,
                Action::RetryDispatch,
                Subject::Shipment(shipment),
            ) => ActionOutcome::Redispatched(self.dispatch.redispatch(shipment)?),
            (NotificationKind::RunWithoutShipments, Action::DiscardRun, Subject::Run(run)) => {
                self.dispatch.discard_empty_run(run)?;
                ActionOutcome::RunDiscarded(run)
            }
            (_, Action::Redirect, subject) => {
                notifications.mark_read(id)?;
                return Ok(ActionOutcome::Redirected(subject));
            }
            (_, Action::Defer, _) => {
                notifications.mark_read(id)?;
                tracing::debug!(notification = %id, "notification deferred");
                return Ok(ActionOutcome::Deferred);
            }
            (kind, action, _) => {
                tracing::debug!(notification = %id, ?kind, action = ?action.kind(), "action ignored");
                return Ok(ActionOutcome::Ignored);
            }
        };

        notifications.mark_processed(id)?;
        tracing::info!(notification = %id, kind = ?notification.kind, action = ?action.kind(), "notification processed");
        Ok(outcome)
    }
}
