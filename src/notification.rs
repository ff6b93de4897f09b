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

//! Operator notifications.
//!
//! The [`NotificationCenter`] stores every notification, refuses duplicates
//! for the same `(kind, subject)` while one is still unprocessed, and keeps an
//! outbox queue that the delivery layer drains in raising order.

use crate::base::{ComplaintId, IncidentId, NotificationId, RunId, Sequence, ShipmentId, VehicleId};
use crate::error::DispatchError;
use chrono::NaiveDateTime;
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ManualRefundRequired,
    CompensationApplied,
    IncidentReported,
    ComplaintOpened,
    MaintenanceDue,
    MaintenanceReturnDue,
    MaintenanceConflict,
    RunWithoutShipments,
    UnassignedShipment,
}

/// Action kinds an operator may submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ConfirmMaintenanceStart,
    ConfirmMaintenanceReturn,
    ConfirmRefund,
    Reassign,
    RetryDispatch,
    DiscardRun,
    Redirect,
    Defer,
}

impl NotificationKind {
    pub fn actions(&self) -> &'static [ActionKind] {
        use ActionKind::*;
        match self {
            NotificationKind::ManualRefundRequired | NotificationKind::CompensationApplied => {
                &[ConfirmRefund, Defer]
            }
            NotificationKind::IncidentReported | NotificationKind::ComplaintOpened => {
                &[Reassign, Redirect, Defer]
            }
            NotificationKind::MaintenanceDue => &[ConfirmMaintenanceStart, Defer],
            NotificationKind::MaintenanceReturnDue => &[ConfirmMaintenanceReturn, Defer],
            NotificationKind::MaintenanceConflict => &[Redirect, Defer],
            NotificationKind::RunWithoutShipments => &[DiscardRun, Redirect, Defer],
            NotificationKind::UnassignedShipment => &[RetryDispatch, Redirect, Defer],
        }
    }
}

/// The entity a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "entity", content = "id", rename_all = "snake_case")]
pub enum Subject {
    Shipment(ShipmentId),
    Run(RunId),
    Vehicle(VehicleId),
    Incident(IncidentId),
    Complaint(ComplaintId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Unread,
    Read,
    Processed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub subject: Subject,
    pub message: String,
    pub amount: Option<Decimal>,
    pub created_at: NaiveDateTime,
    pub status: NotificationStatus,
    pub actions: Vec<ActionKind>,
}

/// A notification to raise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub subject: Subject,
    pub message: String,
    pub amount: Option<Decimal>,
}

impl NewNotification {
    pub fn new(kind: NotificationKind, subject: Subject, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject,
            message: message.into(),
            amount: None,
        }
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }
}

#[derive(Debug, Default)]
pub struct NotificationCenter {
    notifications: DashMap<NotificationId, Notification>,
    /// Unprocessed notification per `(kind, subject)`.
    open: DashMap<(NotificationKind, Subject), NotificationId>,
    /// Raised or re-surfaced notifications awaiting delivery.
    outbox: SegQueue<NotificationId>,
    ids: Sequence,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises a notification unless an unprocessed one already exists for the
    /// same kind and subject. Returns the id of whichever notification stands.
    pub fn raise(&self, new: NewNotification, at: NaiveDateTime) -> NotificationId {
        match self.open.entry((new.kind, new.subject)) {
            Entry::Occupied(existing) => *existing.get(),
            Entry::Vacant(slot) => {
                let id = NotificationId(self.ids.next());
                tracing::info!(notification = %id, kind = ?new.kind, subject = ?new.subject, "notification raised");
                self.notifications.insert(
                    id,
                    Notification {
                        id,
                        kind: new.kind,
                        subject: new.subject,
                        message: new.message,
                        amount: new.amount,
                        created_at: at,
                        status: NotificationStatus::Unread,
                        actions: new.kind.actions().to_vec(),
                    },
                );
                slot.insert(id);
                self.outbox.push(id);
                id
            }
        }
    }

    pub fn get(&self, id: NotificationId) -> Option<Notification> {
        self.notifications.get(&id).map(|n| n.clone())
    }

    /// Unprocessed notifications in raising order.
    pub fn unprocessed(&self) -> Vec<Notification> {
        let mut pending: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| n.status != NotificationStatus::Processed)
            .map(|n| n.clone())
            .collect();
        pending.sort_by_key(|n| n.id);
        pending
    }

    /// Open notification of `kind` about `subject`, if any.
    pub fn find_open(&self, kind: NotificationKind, subject: Subject) -> Option<NotificationId> {
        self.open.get(&(kind, subject)).map(|id| *id)
    }

    /// Hands queued notifications to the delivery layer.
    pub fn drain_outbox(&self) -> Vec<Notification> {
        let mut drained = Vec::new();
        while let Some(id) = self.outbox.pop() {
            if let Some(n) = self.get(id) {
                drained.push(n);
            }
        }
        drained
    }

    /// Queues every READ notification for delivery again.
    pub fn resurface_read(&self) -> usize {
        let mut read: Vec<NotificationId> = self
            .notifications
            .iter()
            .filter(|n| n.status == NotificationStatus::Read)
            .map(|n| n.id)
            .collect();
        read.sort();
        for id in &read {
            self.outbox.push(*id);
        }
        read.len()
    }

    /// Fails with [`DispatchError::AlreadyProcessed`] once processed.
    pub(crate) fn ensure_actionable(&self, id: NotificationId) -> Result<Notification, DispatchError> {
        let notification = self
            .get(id)
            .ok_or(DispatchError::not_found("notification", id.0))?;
        if notification.status == NotificationStatus::Processed {
            return Err(DispatchError::AlreadyProcessed(id));
        }
        Ok(notification)
    }

    pub fn mark_read(&self, id: NotificationId) -> Result<(), DispatchError> {
        let mut n = self
            .notifications
            .get_mut(&id)
            .ok_or(DispatchError::not_found("notification", id.0))?;
        match n.status {
            NotificationStatus::Processed => Err(DispatchError::AlreadyProcessed(id)),
            NotificationStatus::Unread | NotificationStatus::Read => {
                n.status = NotificationStatus::Read;
                Ok(())
            }
        }
    }

    /// Final state. A second call fails with [`DispatchError::AlreadyProcessed`].
    pub(crate) fn mark_processed(&self, id: NotificationId) -> Result<(), DispatchError> {
        let key = {
            let mut n = self
                .notifications
                .get_mut(&id)
                .ok_or(DispatchError::not_found("notification", id.0))?;
            if n.status == NotificationStatus::Processed {
                return Err(DispatchError::AlreadyProcessed(id));
            }
            n.status = NotificationStatus::Processed;
            (n.kind, n.subject)
        };
        self.open.remove_if(&key, |_, open_id| *open_id == id);
        Ok(())
    }
}
