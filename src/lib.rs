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

//! # Parcel Dispatch
//!
//! This library is the core of a parcel-delivery back office: it assigns
//! shipments to delivery runs, locks drivers and vehicles, bills clients,
//! reconciles payments and resolves incidents and complaints, surfacing
//! decisions to operators as notifications.
//!
//! ## Core Components
//!
//! - [`Engine`]: Wires every component around shared tables
//! - [`DispatchEngine`]: Shipment intake, run assignment and run lifecycle
//! - [`Billing`]: Invoices, payments and the client balance ledger
//! - [`Resolution`]: Incident and complaint cascades
//! - [`Workflow`]: Operator actions on notifications
//! - [`Sweeper`]: Periodic morning and evening sweeps
//! - [`DispatchError`]: Every failure an operation can return
//!
//! ## Example
//!
//! ```
//! use parcel_dispatch::{
//!     Config, Engine, ServiceTier, ShipmentRequest, Tariff, VehicleSpec, Zone,
//! };
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::with_system_clock(Config::default());
//! let client = engine.register_client("Sarl Atlas", None, None).unwrap();
//! let blida = engine.register_destination("Blida", Zone::Center, 2, dec!(50)).unwrap();
//! engine
//!     .set_tariff(blida, ServiceTier::Standard, Tariff::new(dec!(500), dec!(10)))
//!     .unwrap();
//! engine.register_driver("Karim");
//! engine
//!     .register_vehicle(VehicleSpec {
//!         plate: "00123-116-16".into(),
//!         capacity_kg: dec!(1000),
//!         capacity_m3: dec!(12),
//!         avg_consumption: dec!(10),
//!         odometer_km: dec!(0),
//!     })
//!     .unwrap();
//!
//! let receipt = engine
//!     .create_shipment(ShipmentRequest {
//!         client,
//!         origin: "Alger".into(),
//!         destination: blida,
//!         tier: ServiceTier::Standard,
//!         weight_kg: dec!(20),
//!         volume_m3: dec!(0.1),
//!     })
//!     .unwrap();
//!
//! assert_eq!(receipt.amount, dec!(700));
//! assert!(receipt.assignment.is_some());
//! assert_eq!(engine.account(client).unwrap().balance(), dec!(833.00));
//! ```
//!
//! ## Thread Safety
//!
//! Operations run in parallel across clients. Billing and payments of one
//! client are serialized on its account lock, and driver/vehicle
//! reservation is atomic.

mod base;
pub mod billing;
pub mod clock;
pub mod config;
pub mod dispatch;
mod engine;
pub mod error;
pub mod incident;
pub mod invoice;
pub mod ledger;
pub mod notification;
pub mod resolution;
pub mod resource;
pub mod run;
pub mod shipment;
mod store;
pub mod sweep;
pub mod tariff;
pub mod tracking;
pub mod workflow;

pub use base::{
    AgentId, ClientId, ComplaintId, DestinationId, DriverId, IncidentId, InvoiceId,
    NotificationId, PaymentId, RunId, ShipmentId, VehicleId,
};
pub use billing::{BalanceAudit, Billed, Billing, InvoiceCancellation};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use dispatch::{
    Assignment, DispatchEngine, DueRuns, Redispatch, RetryReport, RunTransition, ShipmentReceipt,
};
pub use engine::Engine;
pub use error::{DispatchError, Resource};
pub use incident::{
    Complaint, ComplaintStatus, Incident, IncidentKind, IncidentStatus, IncidentTarget, Outcome,
    Severity, ShipmentRefund, Shortfall,
};
pub use invoice::{Invoice, InvoiceLine, InvoiceStatus, Payment, PaymentMethod, PaymentStatus};
pub use ledger::{Client, ClientAccount};
pub use notification::{
    ActionKind, Notification, NotificationCenter, NotificationKind, NotificationStatus, Subject,
};
pub use resolution::{IncidentResolution, Resolution};
pub use resource::{Driver, ResourceRegistry, ResourceStatus, Vehicle, VehicleSpec};
pub use run::{Run, RunOrigin, RunPlan, RunStatus};
pub use shipment::{Shipment, ShipmentRequest, ShipmentStatus};
pub use store::{Context, Store};
pub use sweep::{SweepReport, Sweeper};
pub use tariff::{Destination, InMemoryTariffBook, ServiceTier, Tariff, TariffBook, Zone};
pub use tracking::{TrackingEvent, TrackingKind};
pub use workflow::{Action, ActionOutcome, Workflow};
