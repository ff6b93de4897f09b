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

//! Shipments.
//!
//! ```text
//!  Pending ──run starts──► InTransit ──run completes──► Delivered
//!     │                       │                            │
//!     ├──────incident─────────┼──► Cancelled ◄─────────────┘
//!     └──────incident─────────┴──► Reshipped ──run starts──► InTransit
//! ```

use crate::base::{ClientId, DestinationId, RunId, ShipmentId};
use crate::error::DispatchError;
use crate::tariff::ServiceTier;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Pending,
    InTransit,
    Delivered,
    Failed,
    Cancelled,
    Reshipped,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "PENDING",
            ShipmentStatus::InTransit => "IN_TRANSIT",
            ShipmentStatus::Delivered => "DELIVERED",
            ShipmentStatus::Failed => "FAILED",
            ShipmentStatus::Cancelled => "CANCELLED",
            ShipmentStatus::Reshipped => "RESHIPPED",
        }
    }

    /// Waiting for its run to depart.
    pub fn is_awaiting_departure(&self) -> bool {
        matches!(self, ShipmentStatus::Pending | ShipmentStatus::Reshipped)
    }

    /// Cancelled shipments never move again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ShipmentStatus::Cancelled)
    }

    /// Validates a move and returns the new status.
    pub fn transition(self, to: ShipmentStatus) -> Result<ShipmentStatus, DispatchError> {
        use ShipmentStatus::*;
        let allowed = match (self, to) {
            (Pending | Reshipped, InTransit) => true,
            (InTransit, Delivered | Failed) => true,
            (Pending | Reshipped | InTransit | Failed | Delivered, Cancelled) => true,
            (Pending | Reshipped | InTransit | Failed, Reshipped) => true,
            (Pending, _) | (InTransit, _) | (Delivered, _) | (Failed, _) => false,
            (Cancelled, _) | (Reshipped, _) => false,
        };
        if allowed {
            Ok(to)
        } else {
            Err(DispatchError::InvalidTransition {
                entity: "shipment",
                from: self.as_str(),
                to: to.as_str(),
            })
        }
    }
}

/// What the UI layer submits to create a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentRequest {
    pub client: ClientId,
    pub origin: String,
    pub destination: DestinationId,
    pub tier: ServiceTier,
    pub weight_kg: Decimal,
    pub volume_m3: Decimal,
}

impl ShipmentRequest {
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.weight_kg <= Decimal::ZERO {
            return Err(DispatchError::Validation("weight must be positive".into()));
        }
        if self.volume_m3 < Decimal::ZERO {
            return Err(DispatchError::Validation("volume cannot be negative".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub client: ClientId,
    pub origin: String,
    pub destination: DestinationId,
    pub tier: ServiceTier,
    pub weight_kg: Decimal,
    pub volume_m3: Decimal,
    /// HT price from the tariff. Only a reshipment re-prices it.
    pub amount: Decimal,
    pub status: ShipmentStatus,
    pub run: Option<RunId>,
    pub created_at: NaiveDateTime,
    pub expected_delivery: Option<NaiveDate>,
    pub delivered_at: Option<NaiveDateTime>,
    /// Reshipped and still owed a new invoice line.
    pub rebill_pending: bool,
}

impl Shipment {
    pub(crate) fn new(
        id: ShipmentId,
        request: ShipmentRequest,
        amount: Decimal,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            client: request.client,
            origin: request.origin,
            destination: request.destination,
            tier: request.tier,
            weight_kg: request.weight_kg,
            volume_m3: request.volume_m3,
            amount,
            status: ShipmentStatus::Pending,
            run: None,
            created_at,
            expected_delivery: None,
            delivered_at: None,
            rebill_pending: false,
        }
    }

    /// Unassigned and still expecting a run.
    pub fn is_unassigned(&self) -> bool {
        self.run.is_none() && self.status.is_awaiting_departure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use ShipmentStatus::*;

    #[test]
    fn forward_moves_are_allowed() {
        assert_eq!(Pending.transition(InTransit), Ok(InTransit));
        assert_eq!(InTransit.transition(Delivered), Ok(Delivered));
        assert_eq!(Reshipped.transition(InTransit), Ok(InTransit));
    }

    #[test]
    fn delivered_can_only_be_cancelled() {
        assert_eq!(Delivered.transition(Cancelled), Ok(Cancelled));
        assert!(Delivered.transition(Reshipped).is_err());
        assert!(Delivered.transition(InTransit).is_err());
    }

    #[test]
    fn cancelled_is_terminal() {
        for to in [Pending, InTransit, Delivered, Failed, Reshipped, Cancelled] {
            assert!(Cancelled.transition(to).is_err());
        }
    }

    #[test]
    fn pending_cannot_skip_to_delivered() {
        assert_eq!(
            Pending.transition(Delivered),
            Err(DispatchError::InvalidTransition {
                entity: "shipment",
                from: "PENDING",
                to: "DELIVERED",
            })
        );
    }

    #[test]
    fn request_validation() {
        let mut request = ShipmentRequest {
            client: ClientId(1),
            origin: "Alger".into(),
            destination: DestinationId(1),
            tier: ServiceTier::Standard,
            weight_kg: dec!(0),
            volume_m3: dec!(0.1),
        };
        assert!(request.validate().is_err());
        request.weight_kg = dec!(2);
        assert!(request.validate().is_ok());
        request.volume_m3 = dec!(-1);
        assert!(request.validate().is_err());
    }
}
