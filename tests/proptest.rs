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

//! Property-based tests for the dispatch and billing engine.
//!
//! These tests verify invariants that should hold for any sequence of
//! operator and client operations, whether each one succeeds or not.

use chrono::{Duration, NaiveDate};
use parcel_dispatch::{
    AgentId, ClientId, Config, DestinationId, DispatchError, Engine, IncidentId, IncidentKind,
    IncidentTarget, InvoiceId, ManualClock, Outcome, PaymentMethod, PaymentStatus, ServiceTier,
    Severity, ShipmentRequest, Tariff, VehicleSpec, Zone,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Parcel weight between 0.1 and 120 kg.
fn arb_weight() -> impl Strategy<Value = Decimal> {
    (1i64..=1200i64).prop_map(|tenths| Decimal::new(tenths, 1))
}

/// Money amount between 0.01 and 2000.
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=200_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

#[derive(Debug, Clone)]
enum Op {
    Ship { client: usize, weight: Decimal, express: bool },
    Pay { invoice: usize, percent: u32 },
    Void { payment: usize },
    CancelInvoice { invoice: usize },
    Incident { shipment: usize, kind: IncidentKind, choice: Outcome },
    ConfirmRefund { incident: usize },
    Compensate { client: usize, amount: Decimal },
    NextDay,
}

fn arb_kind() -> impl Strategy<Value = IncidentKind> {
    prop_oneof![
        Just(IncidentKind::Loss),
        Just(IncidentKind::TechnicalFailure),
        Just(IncidentKind::Delay),
        Just(IncidentKind::RecipientAbsent),
        Just(IncidentKind::Other),
    ]
}

fn arb_choice() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        Just(Outcome::Continue),
        Just(Outcome::Reship),
        Just(Outcome::Cancel),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..2usize, arb_weight(), any::<bool>())
            .prop_map(|(client, weight, express)| Op::Ship { client, weight, express }),
        3 => (0..8usize, 1..=100u32).prop_map(|(invoice, percent)| Op::Pay { invoice, percent }),
        1 => (0..8usize).prop_map(|payment| Op::Void { payment }),
        1 => (0..8usize).prop_map(|invoice| Op::CancelInvoice { invoice }),
        2 => (0..12usize, arb_kind(), arb_choice())
            .prop_map(|(shipment, kind, choice)| Op::Incident { shipment, kind, choice }),
        1 => (0..4usize).prop_map(|incident| Op::ConfirmRefund { incident }),
        1 => (0..2usize, arb_amount()).prop_map(|(client, amount)| Op::Compensate { client, amount }),
        1 => Just(Op::NextDay),
    ]
}

// =============================================================================
// Harness
// =============================================================================

struct World {
    engine: Engine,
    clock: Arc<ManualClock>,
    clients: Vec<ClientId>,
    blida: DestinationId,
    incidents: Vec<IncidentId>,
}

fn make_world(pairs: usize, capacity_kg: Decimal) -> World {
    let start = NaiveDate::from_ymd_opt(2025, 3, 10)
        .and_then(|d| d.and_hms_opt(10, 0, 0))
        .unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let engine = Engine::new(Config::default(), clock.clone());
    let clients = vec![
        engine.register_client("Sarl Atlas", None, None).unwrap(),
        engine.register_client("Eurl Tassili", None, None).unwrap(),
    ];
    let blida = engine
        .register_destination("Blida", Zone::Center, 2, dec!(50))
        .unwrap();
    engine
        .set_tariff(blida, ServiceTier::Standard, Tariff::new(dec!(500), dec!(10)))
        .unwrap();
    engine
        .set_tariff(
            blida,
            ServiceTier::Express,
            Tariff::new(dec!(900), dec!(15)).with_volume_rate(dec!(120)),
        )
        .unwrap();
    for i in 0..pairs {
        engine.register_driver(format!("driver {i}"));
        engine
            .register_vehicle(VehicleSpec {
                plate: format!("{i:05}-116-16"),
                capacity_kg,
                capacity_m3: dec!(12),
                avg_consumption: dec!(10),
                odometer_km: dec!(0),
            })
            .unwrap();
    }
    World {
        engine,
        clock,
        clients,
        blida,
        incidents: Vec::new(),
    }
}

fn pick<T: Copy>(items: &[T], index: usize) -> Option<T> {
    if items.is_empty() {
        None
    } else {
        Some(items[index % items.len()])
    }
}

impl World {
    fn invoices(&self) -> Vec<InvoiceId> {
        let mut ids: Vec<InvoiceId> = self
            .clients
            .iter()
            .flat_map(|c| self.engine.store().invoices_for_client(*c))
            .map(|i| i.id)
            .collect();
        ids.sort();
        ids
    }

    fn apply_ship(&self, weight: Decimal) {
        let _ = self.engine.create_shipment(ShipmentRequest {
            client: self.clients[0],
            origin: "Alger".into(),
            destination: self.blida,
            tier: ServiceTier::Standard,
            weight_kg: weight,
            volume_m3: dec!(0.25),
        });
    }

    fn apply(&mut self, op: &Op) {
        let engine = &self.engine;
        match op {
            Op::Ship {
                client,
                weight,
                express,
            } => {
                let tier = if *express {
                    ServiceTier::Express
                } else {
                    ServiceTier::Standard
                };
                let _ = engine.create_shipment(ShipmentRequest {
                    client: self.clients[*client],
                    origin: "Alger".into(),
                    destination: self.blida,
                    tier,
                    weight_kg: *weight,
                    volume_m3: dec!(0.25),
                });
            }
            Op::Pay { invoice, percent } => {
                let Some(id) = pick(&self.invoices(), *invoice) else {
                    return;
                };
                let Ok(invoice) = engine.store().invoice(id) else {
                    return;
                };
                let amount = (invoice.remainder() * Decimal::from(*percent)
                    / Decimal::ONE_HUNDRED)
                    .round_dp(2);
                let _ = engine
                    .billing()
                    .apply_payment(id, amount, PaymentMethod::Cash, None);
            }
            Op::Void { payment } => {
                let payments: Vec<_> = self
                    .invoices()
                    .into_iter()
                    .flat_map(|i| engine.store().payments_for_invoice(i))
                    .map(|p| p.id)
                    .collect();
                if let Some(id) = pick(&payments, *payment) {
                    let _ = engine.billing().void_payment(id);
                }
            }
            Op::CancelInvoice { invoice } => {
                if let Some(id) = pick(&self.invoices(), *invoice) {
                    let _ = engine.billing().cancel_single_shipment_invoice(id);
                }
            }
            Op::Incident {
                shipment,
                kind,
                choice,
            } => {
                let shipments: Vec<_> = engine.store().shipments().iter().map(|s| s.id).collect();
                let Some(id) = pick(&shipments, *shipment) else {
                    return;
                };
                let resolution = engine.resolution();
                if let Ok(incident) = resolution.report_incident(
                    IncidentTarget::Shipment(id),
                    *kind,
                    Severity::Medium,
                    "generated",
                ) {
                    let _ = resolution.resolve_incident(incident, *choice, "generated");
                    self.incidents.push(incident);
                }
            }
            Op::ConfirmRefund { incident } => {
                if let Some(id) = pick(&self.incidents, *incident) {
                    let _ = engine.resolution().confirm_refund(id);
                }
            }
            Op::Compensate { client, amount } => {
                let resolution = engine.resolution();
                if let Ok(complaint) =
                    resolution.open_complaint(self.clients[*client], None, "service quality")
                {
                    let _ = resolution.assign_complaint_agent(complaint, AgentId(1));
                    let _ = resolution.respond_to_complaint(complaint, "apologies");
                    let _ = resolution.resolve_complaint(complaint, Some(*amount));
                }
            }
            Op::NextDay => {
                self.clock.advance(Duration::days(1));
                let _ = engine.sweeper().morning_sweep();
            }
        }
    }
}

// =============================================================================
// Balance Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// The running balance always matches a recomputation from invoices,
    /// payments, refunds, compensations and disbursements.
    #[test]
    fn balance_matches_audit(ops in prop::collection::vec(arb_op(), 1..40)) {
        let mut world = make_world(3, dec!(500));
        for op in &ops {
            world.apply(op);
        }

        for client in &world.clients {
            let audit = world.engine.billing().audit_balance(*client).unwrap();
            prop_assert_eq!(audit.recorded, audit.expected);

            let account = world.engine.account(*client).unwrap();
            prop_assert_eq!(
                account.balance(),
                account.billed() - account.paid() - account.refunded() + account.disbursed()
            );
        }
    }

    /// Valid payments never exceed the TTC of their invoice, and the
    /// invoice's paid total is exactly their sum. Payments on an invoice
    /// cancelled by an incident stay valid and are owed back by hand.
    #[test]
    fn payments_never_exceed_invoice(ops in prop::collection::vec(arb_op(), 1..40)) {
        let mut world = make_world(2, dec!(500));
        for op in &ops {
            world.apply(op);
        }

        for id in world.invoices() {
            let invoice = world.engine.store().invoice(id).unwrap();
            let valid: Decimal = world
                .engine
                .store()
                .payments_for_invoice(id)
                .iter()
                .filter(|p| p.status == PaymentStatus::Valid)
                .map(|p| p.amount)
                .sum();
            prop_assert!(valid <= invoice.totals.ttc);
            prop_assert_eq!(valid, invoice.paid);
        }
    }
}

// =============================================================================
// Capacity Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// No run ever carries more weight than its vehicle, and its load is the
    /// sum of the shipments it lists.
    #[test]
    fn runs_respect_vehicle_capacity(
        weights in prop::collection::vec(arb_weight(), 1..30),
    ) {
        let world = make_world(4, dec!(150));
        for weight in &weights {
            world.apply_ship(*weight);
        }

        let shipments = world.engine.store().shipments();
        for run in world.engine.store().runs() {
            prop_assert!(run.load_kg <= run.capacity_kg);
            let carried: Decimal = shipments
                .iter()
                .filter(|s| run.shipments.contains(&s.id))
                .map(|s| s.weight_kg)
                .sum();
            prop_assert_eq!(carried, run.load_kg);
        }
        for shipment in &shipments {
            if let Some(run) = shipment.run {
                let run = world.engine.store().run(run).unwrap();
                prop_assert!(run.shipments.contains(&shipment.id));
            }
        }
    }

    /// A payment is refused exactly when it exceeds the unpaid remainder.
    #[test]
    fn payment_guard_matches_remainder(
        amounts in prop::collection::vec(arb_amount(), 1..10),
    ) {
        let world = make_world(0, dec!(500));
        world.apply_ship(dec!(50));
        let invoice = world.invoices()[0];
        let billing = world.engine.billing();

        for amount in amounts {
            let remainder = world.engine.store().invoice(invoice).unwrap().remainder();
            let result = billing.apply_payment(invoice, amount, PaymentMethod::Card, None);
            if remainder <= Decimal::ZERO {
                prop_assert!(
                    matches!(result, Err(DispatchError::InvalidTransition { .. })),
                    "paid invoice accepted a payment"
                );
            } else if amount > remainder {
                prop_assert_eq!(
                    result,
                    Err(DispatchError::InsufficientBalanceGuard { amount, remaining: remainder })
                );
            } else {
                prop_assert!(result.is_ok());
            }
        }
    }
}
