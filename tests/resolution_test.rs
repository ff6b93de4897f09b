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

//! Incident and complaint cascades through the public API.

use chrono::{NaiveDate, NaiveDateTime};
use parcel_dispatch::{
    AgentId, ClientId, ComplaintStatus, Config, DestinationId, DispatchError, Engine,
    IncidentKind, IncidentStatus, IncidentTarget, InvoiceStatus, ManualClock, NotificationKind,
    Outcome, PaymentMethod, ServiceTier, Severity, ShipmentId, ShipmentRequest, ShipmentStatus,
    Subject, Tariff, TrackingKind, VehicleSpec, Zone,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn monday(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 10)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .unwrap()
}

struct Fixture {
    engine: Engine,
    client: ClientId,
    blida: DestinationId,
}

/// Standard costs 500 + 10/kg; express is a flat 1000 HT (1190.00 TTC).
fn make_fixture() -> Fixture {
    let engine = Engine::new(Config::default(), Arc::new(ManualClock::new(monday(10))));
    let client = engine.register_client("Sarl Atlas", None, None).unwrap();
    let blida = engine
        .register_destination("Blida", Zone::Center, 2, dec!(50))
        .unwrap();
    engine
        .set_tariff(blida, ServiceTier::Standard, Tariff::new(dec!(500), dec!(10)))
        .unwrap();
    engine
        .set_tariff(blida, ServiceTier::Express, Tariff::new(dec!(1000), dec!(0)))
        .unwrap();
    Fixture {
        engine,
        client,
        blida,
    }
}

fn make_pair(engine: &Engine) {
    engine.register_driver("Karim");
    engine
        .register_vehicle(VehicleSpec {
            plate: "00123-116-16".into(),
            capacity_kg: dec!(1000),
            capacity_m3: dec!(12),
            avg_consumption: dec!(10),
            odometer_km: dec!(0),
        })
        .unwrap();
}

fn make_shipment(f: &Fixture, client: ClientId, tier: ServiceTier) -> ShipmentId {
    f.engine
        .create_shipment(ShipmentRequest {
            client,
            origin: "Alger".into(),
            destination: f.blida,
            tier,
            weight_kg: dec!(20),
            volume_m3: dec!(0.1),
        })
        .unwrap()
        .shipment
}

fn balance(f: &Fixture, client: ClientId) -> Decimal {
    f.engine.account(client).unwrap().balance()
}

// =============================================================================
// Incidents
// =============================================================================

#[test]
fn loss_on_unpaid_shipment_cancels_it_and_nets_to_zero() {
    let f = make_fixture();
    let shipment = make_shipment(&f, f.client, ServiceTier::Express);
    let invoice = f.engine.store().invoices_for_shipment(shipment)[0].id;
    assert_eq!(balance(&f, f.client), dec!(1190.00));

    let resolution = f.engine.resolution();
    let incident = resolution
        .report_incident(
            IncidentTarget::Shipment(shipment),
            IncidentKind::Loss,
            Severity::High,
            "parcel missing at the hub",
        )
        .unwrap();
    // Loss always cancels whatever the operator picked
    let resolved = resolution
        .resolve_incident(incident, Outcome::Continue, "client informed")
        .unwrap();

    assert_eq!(resolved.outcome, Outcome::Cancel);
    assert_eq!(resolved.refunds.len(), 1);
    assert_eq!(resolved.refunds[0].amount, dec!(1190.00));
    assert!(resolved.refunds[0].absorbed);
    assert_eq!(resolved.cancelled_invoices, vec![invoice]);
    assert!(resolved.shortfalls.is_empty());

    assert_eq!(balance(&f, f.client), dec!(0));
    assert_eq!(
        f.engine.store().shipment(shipment).unwrap().status,
        ShipmentStatus::Cancelled
    );
    assert_eq!(
        f.engine.store().invoice(invoice).unwrap().status,
        InvoiceStatus::Cancelled
    );

    let notifications = f.engine.notifications();
    assert!(
        notifications
            .find_open(
                NotificationKind::ManualRefundRequired,
                Subject::Incident(incident)
            )
            .is_none()
    );
    let applied = notifications.get(resolved.notification.unwrap()).unwrap();
    assert_eq!(applied.kind, NotificationKind::CompensationApplied);
    assert_eq!(applied.amount, Some(dec!(1190.00)));
    assert!(
        f.engine
            .billing()
            .audit_balance(f.client)
            .unwrap()
            .is_consistent()
    );
}

#[test]
fn loss_on_paid_shipment_needs_a_manual_refund() {
    let f = make_fixture();
    let shipment = make_shipment(&f, f.client, ServiceTier::Express);
    let invoice = f.engine.store().invoices_for_shipment(shipment)[0].id;
    f.engine
        .billing()
        .apply_payment(invoice, dec!(1190), PaymentMethod::Cash, None)
        .unwrap();

    let resolution = f.engine.resolution();
    let incident = resolution
        .report_incident(
            IncidentTarget::Shipment(shipment),
            IncidentKind::Damage,
            Severity::Medium,
            "crushed box",
        )
        .unwrap();
    let resolved = resolution
        .resolve_incident(incident, Outcome::Cancel, "refund by cheque")
        .unwrap();

    assert!(resolved.cancelled_invoices.is_empty());
    assert_eq!(
        f.engine.store().invoice(invoice).unwrap().status,
        InvoiceStatus::Paid
    );
    assert_eq!(balance(&f, f.client), dec!(-1190.00));
    assert_eq!(resolved.shortfalls.len(), 1);
    assert_eq!(resolved.shortfalls[0].amount, dec!(1190.00));

    let manual = f
        .engine
        .notifications()
        .get(resolved.notification.unwrap())
        .unwrap();
    assert_eq!(manual.kind, NotificationKind::ManualRefundRequired);
    assert_eq!(manual.amount, Some(dec!(1190.00)));
    assert!(
        f.engine
            .billing()
            .audit_balance(f.client)
            .unwrap()
            .is_consistent()
    );

    assert_eq!(resolution.confirm_refund(incident).unwrap(), dec!(1190.00));
    assert_eq!(balance(&f, f.client), dec!(0));
    assert!(!f.engine.store().incident(incident).unwrap().refund_pending);
    assert!(matches!(
        resolution.confirm_refund(incident),
        Err(DispatchError::Validation(_))
    ));
    assert!(
        f.engine
            .billing()
            .audit_balance(f.client)
            .unwrap()
            .is_consistent()
    );
}

#[test]
fn incident_on_a_cancelled_shipment_refunds_nothing() {
    let f = make_fixture();
    let shipment = make_shipment(&f, f.client, ServiceTier::Standard);
    let invoice = f.engine.store().invoices_for_shipment(shipment)[0].id;

    let resolution = f.engine.resolution();
    let incident = resolution
        .report_incident(
            IncidentTarget::Shipment(shipment),
            IncidentKind::Delay,
            Severity::Low,
            "stuck at the depot",
        )
        .unwrap();
    f.engine
        .billing()
        .cancel_single_shipment_invoice(invoice)
        .unwrap();
    assert_eq!(balance(&f, f.client), dec!(0));

    let resolved = resolution
        .resolve_incident(incident, Outcome::Continue, "nothing left to credit")
        .unwrap();

    assert!(resolved.refunds.is_empty());
    assert!(resolved.shortfalls.is_empty());
    assert_eq!(resolved.notification, None);
    assert_eq!(balance(&f, f.client), dec!(0));
    assert_eq!(
        f.engine.store().incident(incident).unwrap().status,
        IncidentStatus::Resolved
    );
    assert!(
        f.engine
            .notifications()
            .find_open(
                NotificationKind::ManualRefundRequired,
                Subject::Incident(incident)
            )
            .is_none()
    );
    assert!(
        f.engine
            .billing()
            .audit_balance(f.client)
            .unwrap()
            .is_consistent()
    );
}

#[test]
fn delay_continues_with_a_partial_refund() {
    let f = make_fixture();
    let shipment = make_shipment(&f, f.client, ServiceTier::Standard);
    let resolution = f.engine.resolution();
    let incident = resolution
        .report_incident(
            IncidentTarget::Shipment(shipment),
            IncidentKind::Delay,
            Severity::Low,
            "road closed",
        )
        .unwrap();

    let resolved = resolution
        .resolve_incident(incident, Outcome::Continue, "delivered tomorrow")
        .unwrap();

    assert_eq!(resolved.outcome, Outcome::Continue);
    assert_eq!(resolved.refunds[0].amount, dec!(41.65));
    assert!(!resolved.refunds[0].absorbed);
    assert_eq!(balance(&f, f.client), dec!(791.35));
    assert_eq!(
        f.engine.store().shipment(shipment).unwrap().status,
        ShipmentStatus::Pending
    );
    let stored = f.engine.store().incident(incident).unwrap();
    assert_eq!(stored.refund_rate, Some(dec!(5)));
    assert_eq!(stored.solution.as_deref(), Some("delivered tomorrow"));
    assert!(
        f.engine
            .billing()
            .audit_balance(f.client)
            .unwrap()
            .is_consistent()
    );
}

#[test]
fn recipient_absent_reships_and_bills_again() {
    let f = make_fixture();
    make_pair(&f.engine);
    let shipment = make_shipment(&f, f.client, ServiceTier::Standard);
    let resolution = f.engine.resolution();
    let incident = resolution
        .report_incident(
            IncidentTarget::Shipment(shipment),
            IncidentKind::RecipientAbsent,
            Severity::Low,
            "nobody home",
        )
        .unwrap();

    let resolved = resolution
        .resolve_incident(incident, Outcome::Reship, "second attempt")
        .unwrap();

    assert!(resolved.refunds.is_empty());
    assert!(resolved.notification.is_none());
    assert_eq!(resolved.redispatched.len(), 1);
    let billed = resolved.redispatched[0].billed.unwrap();
    assert_eq!(billed.charged, dec!(833.00));
    assert_eq!(balance(&f, f.client), dec!(1666.00));

    let reshipped = f.engine.store().shipment(shipment).unwrap();
    assert_eq!(reshipped.status, ShipmentStatus::Reshipped);
    assert!(reshipped.run.is_some());
    assert!(!reshipped.rebill_pending);
    assert!(
        f.engine
            .store()
            .tracking()
            .history(shipment)
            .iter()
            .any(|e| e.kind == TrackingKind::Reshipped)
    );
}

#[test]
fn outcome_must_fit_the_incident_kind() {
    let f = make_fixture();
    let shipment = make_shipment(&f, f.client, ServiceTier::Standard);
    let resolution = f.engine.resolution();

    let absent = resolution
        .report_incident(
            IncidentTarget::Shipment(shipment),
            IncidentKind::WrongAddress,
            Severity::Low,
            "street does not exist",
        )
        .unwrap();
    assert!(matches!(
        resolution.resolve_incident(absent, Outcome::Continue, ""),
        Err(DispatchError::Validation(_))
    ));

    let weather = resolution
        .report_incident(
            IncidentTarget::Shipment(shipment),
            IncidentKind::Weather,
            Severity::Low,
            "sandstorm",
        )
        .unwrap();
    assert!(matches!(
        resolution.resolve_incident(weather, Outcome::Reship, ""),
        Err(DispatchError::Validation(_))
    ));

    assert_eq!(
        f.engine.store().incident(absent).unwrap().status,
        IncidentStatus::Reported
    );
    assert_eq!(balance(&f, f.client), dec!(833.00));
}

#[test]
fn incident_lifecycle_is_enforced() {
    let f = make_fixture();
    let shipment = make_shipment(&f, f.client, ServiceTier::Standard);
    let resolution = f.engine.resolution();
    let incident = resolution
        .report_incident(
            IncidentTarget::Shipment(shipment),
            IncidentKind::Other,
            Severity::Low,
            "label smudged",
        )
        .unwrap();

    assert!(matches!(
        resolution.close_incident(incident),
        Err(DispatchError::InvalidTransition { .. })
    ));
    resolution
        .assign_incident_agent(incident, AgentId(7))
        .unwrap();
    let assigned = f.engine.store().incident(incident).unwrap();
    assert_eq!(assigned.status, IncidentStatus::InProgress);
    assert_eq!(assigned.agent, Some(AgentId(7)));

    resolution
        .resolve_incident(incident, Outcome::Continue, "relabelled")
        .unwrap();
    assert!(matches!(
        resolution.resolve_incident(incident, Outcome::Continue, "again"),
        Err(DispatchError::InvalidTransition { .. })
    ));
    resolution.close_incident(incident).unwrap();
    assert_eq!(
        f.engine.store().incident(incident).unwrap().status,
        IncidentStatus::Closed
    );
}

#[test]
fn run_incident_covers_every_client_on_board() {
    let f = make_fixture();
    make_pair(&f.engine);
    let other = f
        .engine
        .register_client("Eurl Tassili", None, None)
        .unwrap();
    let first = make_shipment(&f, f.client, ServiceTier::Standard);
    let second = make_shipment(&f, other, ServiceTier::Standard);
    let run = f.engine.store().shipment(first).unwrap().run.unwrap();
    assert_eq!(f.engine.store().shipment(second).unwrap().run, Some(run));

    let resolution = f.engine.resolution();
    let incident = resolution
        .report_incident(
            IncidentTarget::Run(run),
            IncidentKind::Accident,
            Severity::Critical,
            "truck overturned",
        )
        .unwrap();
    let resolved = resolution
        .resolve_incident(incident, Outcome::Cancel, "")
        .unwrap();

    assert_eq!(resolved.refunds.len(), 2);
    assert_eq!(resolved.cancelled_invoices.len(), 2);
    for client in [f.client, other] {
        assert_eq!(balance(&f, client), dec!(0));
        assert!(
            f.engine
                .billing()
                .audit_balance(client)
                .unwrap()
                .is_consistent()
        );
    }
    assert!(f.engine.store().run(run).unwrap().shipments.is_empty());
}

// =============================================================================
// Complaints
// =============================================================================

#[test]
fn complaint_walks_through_its_lifecycle() {
    let f = make_fixture();
    let shipment = make_shipment(&f, f.client, ServiceTier::Standard);
    let resolution = f.engine.resolution();

    let complaint = resolution
        .open_complaint(f.client, Some(shipment), "parcel arrived opened")
        .unwrap();
    assert!(
        f.engine
            .notifications()
            .find_open(NotificationKind::ComplaintOpened, Subject::Complaint(complaint))
            .is_some()
    );
    assert!(matches!(
        resolution.resolve_complaint(complaint, None),
        Err(DispatchError::InvalidTransition { .. })
    ));

    resolution
        .assign_complaint_agent(complaint, AgentId(2))
        .unwrap();
    resolution
        .respond_to_complaint(complaint, "we offer a discount")
        .unwrap();
    resolution
        .resolve_complaint(complaint, Some(dec!(100)))
        .unwrap();
    resolution.close_complaint(complaint).unwrap();

    let closed = f.engine.store().complaint(complaint).unwrap();
    assert_eq!(closed.status, ComplaintStatus::Closed);
    assert_eq!(closed.agent, Some(AgentId(2)));
    assert_eq!(closed.compensation, Some(dec!(100)));
    assert_eq!(balance(&f, f.client), dec!(733.00));
    assert!(
        f.engine
            .billing()
            .audit_balance(f.client)
            .unwrap()
            .is_consistent()
    );
    assert!(matches!(
        resolution.cancel_complaint(complaint, "too late"),
        Err(DispatchError::InvalidTransition { .. })
    ));
}

#[test]
fn complaint_cancellation_needs_a_reason() {
    let f = make_fixture();
    let resolution = f.engine.resolution();
    let complaint = resolution
        .open_complaint(f.client, None, "invoice address wrong")
        .unwrap();

    assert!(matches!(
        resolution.cancel_complaint(complaint, "  "),
        Err(DispatchError::Validation(_))
    ));
    resolution
        .cancel_complaint(complaint, "client withdrew")
        .unwrap();
    let cancelled = f.engine.store().complaint(complaint).unwrap();
    assert_eq!(cancelled.status, ComplaintStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("client withdrew"));
}

#[test]
fn complaint_input_is_validated() {
    let f = make_fixture();
    let other = f
        .engine
        .register_client("Eurl Tassili", None, None)
        .unwrap();
    let shipment = make_shipment(&f, f.client, ServiceTier::Standard);
    let resolution = f.engine.resolution();

    assert!(matches!(
        resolution.open_complaint(other, Some(shipment), "not mine"),
        Err(DispatchError::Validation(_))
    ));
    assert!(matches!(
        resolution.open_complaint(f.client, None, ""),
        Err(DispatchError::Validation(_))
    ));

    let complaint = resolution
        .open_complaint(f.client, Some(shipment), "late")
        .unwrap();
    resolution
        .assign_complaint_agent(complaint, AgentId(1))
        .unwrap();
    resolution
        .respond_to_complaint(complaint, "sorry")
        .unwrap();
    assert!(matches!(
        resolution.resolve_complaint(complaint, Some(dec!(-5))),
        Err(DispatchError::Validation(_))
    ));
    assert_eq!(
        f.engine.store().complaint(complaint).unwrap().status,
        ComplaintStatus::AwaitingClient
    );
}
