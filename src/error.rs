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

//! Error types for dispatch, billing and resolution operations.

use crate::base::{DestinationId, DriverId, InvoiceId, NotificationId, VehicleId};
use crate::tariff::ServiceTier;
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// A driver or vehicle named in a reservation conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Driver(DriverId),
    Vehicle(VehicleId),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Driver(id) => write!(f, "driver {id}"),
            Resource::Vehicle(id) => write!(f, "vehicle {id}"),
        }
    }
}

/// Errors returned by every core operation.
///
/// A rejected operation leaves all state exactly as it was before the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Malformed input (non-positive amount or weight, empty reason, ...)
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u32 },

    /// No tariff configured for the destination and service tier
    #[error("no tariff for destination {destination} with tier {tier}")]
    NoTariff {
        destination: DestinationId,
        tier: ServiceTier,
    },

    /// A specific driver or vehicle is not available for reservation
    #[error("{0} is not available")]
    ResourceUnavailable(Resource),

    /// No driver/vehicle pair could be reserved
    #[error("no available driver and vehicle pair")]
    NoResourceAvailable,

    /// Arrival odometer is missing or below the departure reading
    #[error("invalid odometer: departure {departure} km, arrival {arrival} km")]
    InvalidOdometer { departure: Decimal, arrival: Decimal },

    /// Single-shipment operation attempted on a consolidated invoice
    #[error("invoice {invoice} bills {shipments} shipments")]
    MultiShipmentInvoice { invoice: InvoiceId, shipments: usize },

    /// Action submitted against a processed notification
    #[error("notification {0} is already processed")]
    AlreadyProcessed(NotificationId),

    /// Illegal state-machine move
    #[error("{entity} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },

    /// Payment exceeds the unpaid remainder of the invoice
    #[error("payment of {amount} exceeds remaining {remaining}")]
    InsufficientBalanceGuard { amount: Decimal, remaining: Decimal },
}

impl DispatchError {
    pub(crate) fn not_found(entity: &'static str, id: u32) -> Self {
        DispatchError::NotFound { entity, id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            DispatchError::Validation("weight must be positive".into()).to_string(),
            "validation failed: weight must be positive"
        );
        assert_eq!(
            DispatchError::not_found("shipment", 3).to_string(),
            "shipment 3 not found"
        );
        assert_eq!(
            DispatchError::NoTariff {
                destination: DestinationId(2),
                tier: ServiceTier::Express,
            }
            .to_string(),
            "no tariff for destination DST-2 with tier EXPRESS"
        );
        assert_eq!(
            DispatchError::ResourceUnavailable(Resource::Vehicle(VehicleId(9))).to_string(),
            "vehicle VEH-9 is not available"
        );
        assert_eq!(
            DispatchError::NoResourceAvailable.to_string(),
            "no available driver and vehicle pair"
        );
        assert_eq!(
            DispatchError::InvalidOdometer {
                departure: dec!(1200),
                arrival: dec!(1100),
            }
            .to_string(),
            "invalid odometer: departure 1200 km, arrival 1100 km"
        );
        assert_eq!(
            DispatchError::MultiShipmentInvoice {
                invoice: InvoiceId(4),
                shipments: 2,
            }
            .to_string(),
            "invoice INV-4 bills 2 shipments"
        );
        assert_eq!(
            DispatchError::AlreadyProcessed(NotificationId(5)).to_string(),
            "notification NTF-5 is already processed"
        );
        assert_eq!(
            DispatchError::InvalidTransition {
                entity: "run",
                from: "PLANNED",
                to: "COMPLETED",
            }
            .to_string(),
            "run cannot move from PLANNED to COMPLETED"
        );
        assert_eq!(
            DispatchError::InsufficientBalanceGuard {
                amount: dec!(700),
                remaining: dec!(600),
            }
            .to_string(),
            "payment of 700 exceeds remaining 600"
        );
    }

    #[test]
    fn errors_are_cloneable() {
        let error = DispatchError::NoResourceAvailable;
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
