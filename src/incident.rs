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

//! Incidents and complaints.
//!
//! Incident lifecycle:
//!
//! ```text
//! Reported ──assign──► InProgress ──resolve──► Resolved ──close──► Closed
//!     └──────────────resolve──────────────────────┘
//! ```
//!
//! Complaint lifecycle:
//!
//! ```text
//! Open ──assign──► InProgress ──respond──► AwaitingClient ──resolve──► Resolved ──close──► Closed
//!   └───────────────────── cancel (with reason) before Closed ──────────────────────► Cancelled
//! ```

use crate::base::{AgentId, ClientId, ComplaintId, IncidentId, RunId, ShipmentId};
use crate::error::DispatchError;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// How the shipment outcome is chosen for an incident kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomePolicy {
    /// Shipment is always cancelled.
    ForcedCancel,
    /// Operator picks reship or cancel.
    ReshipOrCancel,
    /// Operator picks continue or cancel.
    ContinueOrCancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    Loss,
    Damage,
    Accident,
    TechnicalFailure,
    Delay,
    Weather,
    RecipientAbsent,
    WrongAddress,
    RecipientRefused,
    Other,
}

impl IncidentKind {
    /// Refund percentage of the shipment TTC.
    pub fn refund_rate(&self) -> Decimal {
        match self {
            IncidentKind::Loss | IncidentKind::Damage | IncidentKind::Accident => dec!(100),
            IncidentKind::TechnicalFailure => dec!(50),
            IncidentKind::Delay => dec!(5),
            IncidentKind::Weather | IncidentKind::Other => dec!(0),
            IncidentKind::RecipientAbsent
            | IncidentKind::WrongAddress
            | IncidentKind::RecipientRefused => dec!(0),
        }
    }

    pub fn outcome_policy(&self) -> OutcomePolicy {
        match self {
            IncidentKind::Loss
            | IncidentKind::Damage
            | IncidentKind::Accident
            | IncidentKind::TechnicalFailure => OutcomePolicy::ForcedCancel,
            IncidentKind::RecipientAbsent
            | IncidentKind::WrongAddress
            | IncidentKind::RecipientRefused => OutcomePolicy::ReshipOrCancel,
            IncidentKind::Delay | IncidentKind::Weather | IncidentKind::Other => {
                OutcomePolicy::ContinueOrCancel
            }
        }
    }

    pub fn cause(&self) -> &'static str {
        match self {
            IncidentKind::Loss => "parcel lost",
            IncidentKind::Damage => "parcel damaged",
            IncidentKind::Accident => "road accident",
            IncidentKind::TechnicalFailure => "vehicle technical failure",
            IncidentKind::Delay => "delivery delayed",
            IncidentKind::Weather => "weather conditions",
            IncidentKind::RecipientAbsent => "recipient absent",
            IncidentKind::WrongAddress => "wrong address",
            IncidentKind::RecipientRefused => "recipient refused the parcel",
            IncidentKind::Other => "other cause",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// What happens to the shipment once an incident is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Continue,
    Reship,
    Cancel,
}

impl Outcome {
    /// Outcome actually applied for `kind` given the operator's `choice`.
    pub fn settle(kind: IncidentKind, choice: Outcome) -> Result<Outcome, DispatchError> {
        match (kind.outcome_policy(), choice) {
            (OutcomePolicy::ForcedCancel, _) => Ok(Outcome::Cancel),
            (OutcomePolicy::ReshipOrCancel, Outcome::Reship | Outcome::Cancel) => Ok(choice),
            (OutcomePolicy::ContinueOrCancel, Outcome::Continue | Outcome::Cancel) => Ok(choice),
            (OutcomePolicy::ReshipOrCancel, Outcome::Continue) => Err(DispatchError::Validation(
                format!("{kind:?} incidents must be reshipped or cancelled"),
            )),
            (OutcomePolicy::ContinueOrCancel, Outcome::Reship) => Err(DispatchError::Validation(
                format!("{kind:?} incidents must be continued or cancelled"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    Reported,
    InProgress,
    Resolved,
    Closed,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Reported => "REPORTED",
            IncidentStatus::InProgress => "IN_PROGRESS",
            IncidentStatus::Resolved => "RESOLVED",
            IncidentStatus::Closed => "CLOSED",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, IncidentStatus::Reported | IncidentStatus::InProgress)
    }

    fn reject(self, to: IncidentStatus) -> DispatchError {
        DispatchError::InvalidTransition {
            entity: "incident",
            from: self.as_str(),
            to: to.as_str(),
        }
    }

    /// Assigning or reassigning an agent.
    pub fn assign(self) -> Result<IncidentStatus, DispatchError> {
        match self {
            IncidentStatus::Reported | IncidentStatus::InProgress => Ok(IncidentStatus::InProgress),
            IncidentStatus::Resolved | IncidentStatus::Closed => {
                Err(self.reject(IncidentStatus::InProgress))
            }
        }
    }

    pub fn resolve(self) -> Result<IncidentStatus, DispatchError> {
        match self {
            IncidentStatus::Reported | IncidentStatus::InProgress => Ok(IncidentStatus::Resolved),
            IncidentStatus::Resolved | IncidentStatus::Closed => {
                Err(self.reject(IncidentStatus::Resolved))
            }
        }
    }

    pub fn close(self) -> Result<IncidentStatus, DispatchError> {
        match self {
            IncidentStatus::Resolved => Ok(IncidentStatus::Closed),
            IncidentStatus::Reported | IncidentStatus::InProgress | IncidentStatus::Closed => {
                Err(self.reject(IncidentStatus::Closed))
            }
        }
    }
}

/// What an incident is filed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentTarget {
    Shipment(ShipmentId),
    Run(RunId),
}

/// Refund bookkeeping of one affected shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentRefund {
    pub shipment: ShipmentId,
    pub client: ClientId,
    pub amount: Decimal,
    /// Cancelled together with the shipment's invoice.
    pub absorbed: bool,
}

/// Negative balance left by a refund, to be paid back by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub client: ClientId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub target: IncidentTarget,
    pub kind: IncidentKind,
    pub severity: Severity,
    pub description: String,
    pub reported_at: NaiveDateTime,
    pub agent: Option<AgentId>,
    pub status: IncidentStatus,
    /// Recorded at resolution.
    pub refund_rate: Option<Decimal>,
    pub refunds: Vec<ShipmentRefund>,
    pub outcome: Option<Outcome>,
    pub solution: Option<String>,
    /// Physical refund still awaiting operator confirmation.
    pub refund_pending: bool,
    /// Credit owed back outside the ledger, per client.
    pub shortfalls: Vec<Shortfall>,
}

impl Incident {
    pub fn refunded(&self) -> bool {
        !self.refunds.is_empty()
    }

    pub fn refund_total(&self) -> Decimal {
        self.refunds.iter().map(|r| r.amount).sum()
    }

    pub fn shortfall_total(&self) -> Decimal {
        self.shortfalls.iter().map(|s| s.amount).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplaintStatus {
    Open,
    InProgress,
    AwaitingClient,
    Resolved,
    Closed,
    Cancelled,
}

impl ComplaintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::Open => "OPEN",
            ComplaintStatus::InProgress => "IN_PROGRESS",
            ComplaintStatus::AwaitingClient => "AWAITING_CLIENT",
            ComplaintStatus::Resolved => "RESOLVED",
            ComplaintStatus::Closed => "CLOSED",
            ComplaintStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn transition(self, to: ComplaintStatus) -> Result<ComplaintStatus, DispatchError> {
        use ComplaintStatus::*;
        let allowed = match (self, to) {
            (Open | InProgress, InProgress) => true,
            (InProgress, AwaitingClient) => true,
            (AwaitingClient, Resolved) => true,
            (Resolved, Closed) => true,
            (Open | InProgress | AwaitingClient | Resolved, Cancelled) => true,
            (Open, _) | (InProgress, _) | (AwaitingClient, _) | (Resolved, _) => false,
            (Closed, _) | (Cancelled, _) => false,
        };
        if allowed {
            Ok(to)
        } else {
            Err(DispatchError::InvalidTransition {
                entity: "complaint",
                from: self.as_str(),
                to: to.as_str(),
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: ComplaintId,
    pub client: ClientId,
    pub shipment: Option<ShipmentId>,
    pub subject: String,
    pub opened_at: NaiveDateTime,
    pub agent: Option<AgentId>,
    pub response: Option<String>,
    pub compensation: Option<Decimal>,
    pub cancel_reason: Option<String>,
    pub status: ComplaintStatus,
}
