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

//! Append-only tracking history per shipment.

use crate::base::{IncidentId, RunId, ShipmentId};
use chrono::NaiveDateTime;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackingKind {
    Created,
    AssignedToRun { run: RunId },
    InTransit { run: RunId },
    Delivered { run: RunId },
    Incident { incident: IncidentId },
    Resolved { incident: IncidentId },
    Cancelled,
    Reshipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub shipment: ShipmentId,
    pub at: NaiveDateTime,
    #[serde(flatten)]
    pub kind: TrackingKind,
    pub note: String,
}

/// Tracking events indexed by shipment, in append order.
///
/// Events are never edited. The only removal is [`TrackingLog::purge`], used
/// when a single-shipment invoice is cancelled and the shipment's history is
/// dropped with it.
#[derive(Debug, Default)]
pub struct TrackingLog {
    events: DashMap<ShipmentId, Vec<TrackingEvent>>,
}

impl TrackingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &self,
        shipment: ShipmentId,
        at: NaiveDateTime,
        kind: TrackingKind,
        note: impl Into<String>,
    ) {
        self.events.entry(shipment).or_default().push(TrackingEvent {
            shipment,
            at,
            kind,
            note: note.into(),
        });
    }

    pub fn history(&self, shipment: ShipmentId) -> Vec<TrackingEvent> {
        self.events
            .get(&shipment)
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn purge(&self, shipment: ShipmentId) -> usize {
        self.events
            .remove(&shipment)
            .map(|(_, events)| events.len())
            .unwrap_or(0)
    }
}
