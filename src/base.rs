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

//! Core identifier types for every entity tracked by the back office.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a client account.
    ClientId,
    "CLI"
);
entity_id!(
    /// Unique identifier for a driver.
    DriverId,
    "DRV"
);
entity_id!(
    /// Unique identifier for a vehicle.
    VehicleId,
    "VEH"
);
entity_id!(
    /// Unique identifier for a delivery run ("tournée").
    RunId,
    "RUN"
);
entity_id!(
    /// Unique identifier for a shipment.
    ShipmentId,
    "SHP"
);
entity_id!(
    /// Unique identifier for an invoice.
    InvoiceId,
    "INV"
);
entity_id!(
    /// Unique identifier for a payment.
    PaymentId,
    "PAY"
);
entity_id!(
    /// Unique identifier for an incident.
    IncidentId,
    "INC"
);
entity_id!(
    /// Unique identifier for a client complaint.
    ComplaintId,
    "CMP"
);
entity_id!(
    /// Unique identifier for an operator notification.
    NotificationId,
    "NTF"
);
entity_id!(
    /// Unique identifier for a support agent handling incidents and complaints.
    AgentId,
    "AGT"
);
entity_id!(
    /// Unique identifier for a delivery destination.
    DestinationId,
    "DST"
);

/// Monotonic id allocator shared by all callers of one table.
#[derive(Debug)]
pub(crate) struct Sequence(AtomicU32);

impl Sequence {
    pub(crate) fn new() -> Self {
        Self(AtomicU32::new(1))
    }

    pub(crate) fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}
