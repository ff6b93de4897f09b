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

//! Delivery runs.
//!
//! Runs follow a strictly forward state machine:
//! - [`Planned`](RunStatus::Planned) → [`InProgress`](RunStatus::InProgress) (departure)
//! - [`InProgress`](RunStatus::InProgress) → [`Completed`](RunStatus::Completed) (return)
//!
//! Completed is terminal. Odometer distance and fuel are computed once, on
//! entering it.

use crate::base::{DriverId, RunId, ShipmentId, VehicleId};
use crate::error::DispatchError;
use crate::ledger::round_money;
use crate::tariff::Zone;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Planned,
    InProgress,
    Completed,
}

/// What a requested status change amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStep {
    Depart,
    Complete,
    /// Already in the requested status.
    Unchanged,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Planned => "PLANNED",
            RunStatus::InProgress => "IN_PROGRESS",
            RunStatus::Completed => "COMPLETED",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, RunStatus::Completed)
    }

    pub fn step_to(self, to: RunStatus) -> Result<RunStep, DispatchError> {
        use RunStatus::*;
        match (self, to) {
            (Planned, InProgress) => Ok(RunStep::Depart),
            (InProgress, Completed) => Ok(RunStep::Complete),
            (Planned, Planned) | (InProgress, InProgress) | (Completed, Completed) => {
                Ok(RunStep::Unchanged)
            }
            (Planned, Completed) | (InProgress, Planned) | (Completed, Planned | InProgress) => {
                Err(DispatchError::InvalidTransition {
                    entity: "run",
                    from: self.as_str(),
                    to: to.as_str(),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOrigin {
    Manual,
    Automatic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub zone: Zone,
    pub driver: DriverId,
    pub vehicle: VehicleId,
    pub departure: NaiveDateTime,
    pub returned_at: Option<NaiveDateTime>,
    /// Dedicated to a single express shipment; never shared.
    pub private: bool,
    pub origin: RunOrigin,
    pub status: RunStatus,
    pub shipments: Vec<ShipmentId>,
    pub load_kg: Decimal,
    pub load_m3: Decimal,
    /// Copied from the vehicle when the run is created.
    pub capacity_kg: Decimal,
    pub departure_odometer: Option<Decimal>,
    pub arrival_odometer: Option<Decimal>,
    pub distance_km: Option<Decimal>,
    pub fuel_litres: Option<Decimal>,
}

/// Everything needed to create a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPlan {
    pub zone: Zone,
    pub driver: DriverId,
    pub vehicle: VehicleId,
    pub departure: NaiveDateTime,
    pub private: bool,
}

impl Run {
    pub(crate) fn new(id: RunId, plan: RunPlan, capacity_kg: Decimal, origin: RunOrigin) -> Self {
        Self {
            id,
            zone: plan.zone,
            driver: plan.driver,
            vehicle: plan.vehicle,
            departure: plan.departure,
            returned_at: None,
            private: plan.private,
            origin,
            status: RunStatus::Planned,
            shipments: Vec::new(),
            load_kg: Decimal::ZERO,
            load_m3: Decimal::ZERO,
            capacity_kg,
            departure_odometer: None,
            arrival_odometer: None,
            distance_km: None,
            fuel_litres: None,
        }
    }

    /// A run departs only with at least one shipment on board.
    pub fn can_start(&self) -> bool {
        !self.shipments.is_empty()
    }

    /// Weight-only capacity check.
    pub fn fits(&self, weight_kg: Decimal) -> bool {
        self.load_kg + weight_kg <= self.capacity_kg
    }

    /// Open for new shared shipments in `zone` at `now`.
    pub fn accepts_shared(&self, zone: Zone, now: NaiveDateTime) -> bool {
        !self.private
            && self.status == RunStatus::Planned
            && self.zone == zone
            && self.departure >= now
    }

    pub(crate) fn load(&mut self, shipment: ShipmentId, weight_kg: Decimal, volume_m3: Decimal) {
        if !self.shipments.contains(&shipment) {
            self.shipments.push(shipment);
            self.load_kg += weight_kg;
            self.load_m3 += volume_m3;
        }
    }

    pub(crate) fn unload(&mut self, shipment: ShipmentId, weight_kg: Decimal, volume_m3: Decimal) {
        if let Some(pos) = self.shipments.iter().position(|s| *s == shipment) {
            self.shipments.remove(pos);
            self.load_kg -= weight_kg;
            self.load_m3 -= volume_m3;
        }
    }
}

/// Trip distance and fuel burnt, from the two odometer readings.
pub fn trip_consumption(
    departure_km: Decimal,
    arrival_km: Decimal,
    avg_consumption: Decimal,
) -> Result<(Decimal, Decimal), DispatchError> {
    if arrival_km < departure_km {
        return Err(DispatchError::InvalidOdometer {
            departure: departure_km,
            arrival: arrival_km,
        });
    }
    let distance = arrival_km - departure_km;
    let fuel = round_money(distance * avg_consumption / Decimal::ONE_HUNDRED);
    Ok((distance, fuel))
}
