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

//! Driver and vehicle availability.
//!
//! The registry is the only place availability changes. A resource held by a
//! run is `OnRun` and records the holder; nothing else may reserve it until
//! the holder releases it.
//!
//! # Locking
//!
//! [`ResourceRegistry::reserve`] takes the driver entry and then the vehicle
//! entry (always in that order) and keeps both for the whole check-and-set,
//! so two concurrent reservations of the same resource cannot both win.

use crate::base::{DriverId, RunId, Sequence, VehicleId};
use crate::error::{DispatchError, Resource};
use chrono::NaiveDate;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    Available,
    OnRun,
    /// Driver on leave.
    OnLeave,
    /// Vehicle in the workshop.
    Maintenance,
    OutOfService,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Available => "AVAILABLE",
            ResourceStatus::OnRun => "ON_RUN",
            ResourceStatus::OnLeave => "ON_LEAVE",
            ResourceStatus::Maintenance => "MAINTENANCE",
            ResourceStatus::OutOfService => "OUT_OF_SERVICE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub name: String,
    pub status: ResourceStatus,
    pub run: Option<RunId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceSchedule {
    pub starts_on: NaiveDate,
    pub expected_return: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub plate: String,
    pub capacity_kg: Decimal,
    pub capacity_m3: Decimal,
    /// Litres per 100 km.
    pub avg_consumption: Decimal,
    pub odometer_km: Decimal,
    pub status: ResourceStatus,
    pub run: Option<RunId>,
    pub maintenance: Option<MaintenanceSchedule>,
}

/// Input for registering a vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleSpec {
    pub plate: String,
    pub capacity_kg: Decimal,
    pub capacity_m3: Decimal,
    pub avg_consumption: Decimal,
    pub odometer_km: Decimal,
}

#[derive(Debug, Default)]
pub struct ResourceRegistry {
    drivers: DashMap<DriverId, Driver>,
    vehicles: DashMap<VehicleId, Vehicle>,
    driver_ids: Sequence,
    vehicle_ids: Sequence,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_driver(&self, name: impl Into<String>) -> DriverId {
        let id = DriverId(self.driver_ids.next());
        self.drivers.insert(
            id,
            Driver {
                id,
                name: name.into(),
                status: ResourceStatus::Available,
                run: None,
            },
        );
        id
    }

    pub fn register_vehicle(&self, spec: VehicleSpec) -> Result<VehicleId, DispatchError> {
        if spec.capacity_kg <= Decimal::ZERO {
            return Err(DispatchError::Validation(
                "vehicle weight capacity must be positive".into(),
            ));
        }
        if spec.avg_consumption < Decimal::ZERO || spec.odometer_km < Decimal::ZERO {
            return Err(DispatchError::Validation(
                "vehicle consumption and odometer cannot be negative".into(),
            ));
        }
        let id = VehicleId(self.vehicle_ids.next());
        self.vehicles.insert(
            id,
            Vehicle {
                id,
                plate: spec.plate,
                capacity_kg: spec.capacity_kg,
                capacity_m3: spec.capacity_m3,
                avg_consumption: spec.avg_consumption,
                odometer_km: spec.odometer_km,
                status: ResourceStatus::Available,
                run: None,
                maintenance: None,
            },
        );
        Ok(id)
    }

    pub fn driver(&self, id: DriverId) -> Option<Driver> {
        self.drivers.get(&id).map(|d| d.clone())
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<Vehicle> {
        self.vehicles.get(&id).map(|v| v.clone())
    }

    pub fn vehicles(&self) -> Vec<Vehicle> {
        let mut vehicles: Vec<Vehicle> = self.vehicles.iter().map(|v| v.clone()).collect();
        vehicles.sort_by_key(|v| v.id);
        vehicles
    }

    /// Atomically marks both resources as held by `run`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::ResourceUnavailable`] naming the first resource that
    /// is not `Available`. Nothing is written in that case.
    pub fn reserve(
        &self,
        driver: DriverId,
        vehicle: VehicleId,
        run: RunId,
    ) -> Result<(), DispatchError> {
        let mut d = self
            .drivers
            .get_mut(&driver)
            .ok_or(DispatchError::not_found("driver", driver.0))?;
        let mut v = self
            .vehicles
            .get_mut(&vehicle)
            .ok_or(DispatchError::not_found("vehicle", vehicle.0))?;

        if d.status != ResourceStatus::Available {
            return Err(DispatchError::ResourceUnavailable(Resource::Driver(driver)));
        }
        if v.status != ResourceStatus::Available {
            return Err(DispatchError::ResourceUnavailable(Resource::Vehicle(vehicle)));
        }

        d.status = ResourceStatus::OnRun;
        d.run = Some(run);
        v.status = ResourceStatus::OnRun;
        v.run = Some(run);
        tracing::debug!(%driver, %vehicle, %run, "resources reserved");
        Ok(())
    }

    /// Reserves the first available pair able to carry `weight_kg`.
    ///
    /// Candidates are tried in id order; a candidate lost to a concurrent
    /// reservation is skipped, never waited on.
    pub fn reserve_any(
        &self,
        weight_kg: Decimal,
        run: RunId,
    ) -> Result<(DriverId, VehicleId), DispatchError> {
        let mut drivers: Vec<DriverId> = self
            .drivers
            .iter()
            .filter(|d| d.status == ResourceStatus::Available)
            .map(|d| d.id)
            .collect();
        let mut vehicles: Vec<VehicleId> = self
            .vehicles
            .iter()
            .filter(|v| v.status == ResourceStatus::Available && v.capacity_kg >= weight_kg)
            .map(|v| v.id)
            .collect();
        drivers.sort();
        vehicles.sort();

        for driver in &drivers {
            for vehicle in &vehicles {
                match self.reserve(*driver, *vehicle, run) {
                    Ok(()) => return Ok((*driver, *vehicle)),
                    Err(DispatchError::ResourceUnavailable(Resource::Driver(_))) => break,
                    Err(DispatchError::ResourceUnavailable(Resource::Vehicle(_))) => continue,
                    Err(e) => return Err(e),
                }
            }
        }
        Err(DispatchError::NoResourceAvailable)
    }

    /// Confirms both resources are on `run` when it departs. Idempotent.
    pub fn mark_on_run(
        &self,
        driver: DriverId,
        vehicle: VehicleId,
        run: RunId,
    ) -> Result<(), DispatchError> {
        let mut d = self
            .drivers
            .get_mut(&driver)
            .ok_or(DispatchError::not_found("driver", driver.0))?;
        let mut v = self
            .vehicles
            .get_mut(&vehicle)
            .ok_or(DispatchError::not_found("vehicle", vehicle.0))?;
        if d.run.is_some_and(|held| held != run) {
            return Err(DispatchError::ResourceUnavailable(Resource::Driver(driver)));
        }
        if v.run.is_some_and(|held| held != run) {
            return Err(DispatchError::ResourceUnavailable(Resource::Vehicle(vehicle)));
        }
        d.status = ResourceStatus::OnRun;
        d.run = Some(run);
        v.status = ResourceStatus::OnRun;
        v.run = Some(run);
        Ok(())
    }

    /// Returns both resources to `Available`.
    ///
    /// Refused for a resource currently held by a different run.
    pub fn release(
        &self,
        driver: DriverId,
        vehicle: VehicleId,
        run: RunId,
    ) -> Result<(), DispatchError> {
        let mut d = self
            .drivers
            .get_mut(&driver)
            .ok_or(DispatchError::not_found("driver", driver.0))?;
        let mut v = self
            .vehicles
            .get_mut(&vehicle)
            .ok_or(DispatchError::not_found("vehicle", vehicle.0))?;
        if d.run.is_some_and(|held| held != run) {
            return Err(DispatchError::ResourceUnavailable(Resource::Driver(driver)));
        }
        if v.run.is_some_and(|held| held != run) {
            return Err(DispatchError::ResourceUnavailable(Resource::Vehicle(vehicle)));
        }
        if d.run.is_some() {
            d.status = ResourceStatus::Available;
            d.run = None;
        }
        if v.run.is_some() {
            v.status = ResourceStatus::Available;
            v.run = None;
        }
        tracing::debug!(%driver, %vehicle, %run, "resources released");
        Ok(())
    }

    pub(crate) fn set_odometer(&self, vehicle: VehicleId, km: Decimal) -> Result<(), DispatchError> {
        let mut v = self
            .vehicles
            .get_mut(&vehicle)
            .ok_or(DispatchError::not_found("vehicle", vehicle.0))?;
        v.odometer_km = km;
        Ok(())
    }

    /// Operator change of a driver's availability (leave, out of service,
    /// back to work). A driver held by a run cannot be changed here.
    pub fn set_driver_status(
        &self,
        driver: DriverId,
        status: ResourceStatus,
    ) -> Result<(), DispatchError> {
        let mut d = self
            .drivers
            .get_mut(&driver)
            .ok_or(DispatchError::not_found("driver", driver.0))?;
        if status == ResourceStatus::OnRun || status == ResourceStatus::Maintenance {
            return Err(DispatchError::InvalidTransition {
                entity: "driver",
                from: d.status.as_str(),
                to: status.as_str(),
            });
        }
        if d.run.is_some() {
            return Err(DispatchError::ResourceUnavailable(Resource::Driver(driver)));
        }
        d.status = status;
        Ok(())
    }

    pub fn schedule_maintenance(
        &self,
        vehicle: VehicleId,
        starts_on: NaiveDate,
        expected_return: NaiveDate,
    ) -> Result<(), DispatchError> {
        if expected_return < starts_on {
            return Err(DispatchError::Validation(
                "maintenance return precedes its start".into(),
            ));
        }
        let mut v = self
            .vehicles
            .get_mut(&vehicle)
            .ok_or(DispatchError::not_found("vehicle", vehicle.0))?;
        v.maintenance = Some(MaintenanceSchedule {
            starts_on,
            expected_return,
        });
        Ok(())
    }

    /// Sends the vehicle to the workshop. It must not be held by a run.
    pub fn start_maintenance(&self, vehicle: VehicleId) -> Result<(), DispatchError> {
        let mut v = self
            .vehicles
            .get_mut(&vehicle)
            .ok_or(DispatchError::not_found("vehicle", vehicle.0))?;
        match v.status {
            ResourceStatus::Available => {
                v.status = ResourceStatus::Maintenance;
                tracing::info!(%vehicle, "vehicle entered maintenance");
                Ok(())
            }
            ResourceStatus::OnRun => Err(DispatchError::ResourceUnavailable(Resource::Vehicle(
                vehicle,
            ))),
            other => Err(DispatchError::InvalidTransition {
                entity: "vehicle",
                from: other.as_str(),
                to: ResourceStatus::Maintenance.as_str(),
            }),
        }
    }

    pub fn end_maintenance(&self, vehicle: VehicleId) -> Result<(), DispatchError> {
        let mut v = self
            .vehicles
            .get_mut(&vehicle)
            .ok_or(DispatchError::not_found("vehicle", vehicle.0))?;
        if v.status != ResourceStatus::Maintenance {
            return Err(DispatchError::InvalidTransition {
                entity: "vehicle",
                from: v.status.as_str(),
                to: ResourceStatus::Available.as_str(),
            });
        }
        v.status = ResourceStatus::Available;
        v.maintenance = None;
        tracing::info!(%vehicle, "vehicle back from maintenance");
        Ok(())
    }

    /// Vehicles whose scheduled maintenance starts on `date` and that are not
    /// already in the workshop.
    pub fn maintenance_starting_on(&self, date: NaiveDate) -> Vec<Vehicle> {
        let mut due: Vec<Vehicle> = self
            .vehicles
            .iter()
            .filter(|v| {
                v.status != ResourceStatus::Maintenance
                    && v.maintenance.is_some_and(|m| m.starts_on == date)
            })
            .map(|v| v.clone())
            .collect();
        due.sort_by_key(|v| v.id);
        due
    }

    /// Vehicles in the workshop whose expected return is `today` or earlier.
    pub fn maintenance_due_back(&self, today: NaiveDate) -> Vec<VehicleId> {
        let mut due: Vec<VehicleId> = self
            .vehicles
            .iter()
            .filter(|v| {
                v.status == ResourceStatus::Maintenance
                    && v.maintenance.is_some_and(|m| m.expected_return <= today)
            })
            .map(|v| v.id)
            .collect();
        due.sort();
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn van(capacity_kg: Decimal) -> VehicleSpec {
        VehicleSpec {
            plate: "00123-116-16".into(),
            capacity_kg,
            capacity_m3: dec!(12),
            avg_consumption: dec!(9.5),
            odometer_km: dec!(1000),
        }
    }

    #[test]
    fn reserve_marks_both_on_run() {
        let registry = ResourceRegistry::new();
        let d = registry.register_driver("Karim");
        let v = registry.register_vehicle(van(dec!(1500))).unwrap();

        registry.reserve(d, v, RunId(1)).unwrap();

        assert_eq!(registry.driver(d).unwrap().status, ResourceStatus::OnRun);
        assert_eq!(registry.vehicle(v).unwrap().run, Some(RunId(1)));
    }

    #[test]
    fn reserve_names_the_conflicting_resource() {
        let registry = ResourceRegistry::new();
        let d1 = registry.register_driver("Karim");
        let d2 = registry.register_driver("Nadia");
        let v = registry.register_vehicle(van(dec!(1500))).unwrap();
        registry.reserve(d1, v, RunId(1)).unwrap();

        let result = registry.reserve(d2, v, RunId(2));
        assert_eq!(
            result,
            Err(DispatchError::ResourceUnavailable(Resource::Vehicle(v)))
        );
        // Loser wrote nothing
        assert_eq!(registry.driver(d2).unwrap().status, ResourceStatus::Available);
    }

    #[test]
    fn reserve_any_skips_small_vehicles() {
        let registry = ResourceRegistry::new();
        registry.register_driver("Karim");
        let small = registry.register_vehicle(van(dec!(100))).unwrap();
        let big = registry.register_vehicle(van(dec!(2000))).unwrap();

        let (_, vehicle) = registry.reserve_any(dec!(500), RunId(1)).unwrap();
        assert_eq!(vehicle, big);
        assert_eq!(registry.vehicle(small).unwrap().status, ResourceStatus::Available);
    }

    #[test]
    fn reserve_any_without_pair_fails() {
        let registry = ResourceRegistry::new();
        registry.register_vehicle(van(dec!(1500))).unwrap();
        assert_eq!(
            registry.reserve_any(dec!(10), RunId(1)),
            Err(DispatchError::NoResourceAvailable)
        );
    }

    #[test]
    fn release_by_other_run_is_refused() {
        let registry = ResourceRegistry::new();
        let d = registry.register_driver("Karim");
        let v = registry.register_vehicle(van(dec!(1500))).unwrap();
        registry.reserve(d, v, RunId(1)).unwrap();

        assert!(registry.release(d, v, RunId(2)).is_err());
        registry.release(d, v, RunId(1)).unwrap();
        assert_eq!(registry.driver(d).unwrap().status, ResourceStatus::Available);
        assert_eq!(registry.vehicle(v).unwrap().run, None);
    }

    #[test]
    fn maintenance_requires_idle_vehicle() {
        let registry = ResourceRegistry::new();
        let d = registry.register_driver("Karim");
        let v = registry.register_vehicle(van(dec!(1500))).unwrap();
        registry.reserve(d, v, RunId(1)).unwrap();

        assert_eq!(
            registry.start_maintenance(v),
            Err(DispatchError::ResourceUnavailable(Resource::Vehicle(v)))
        );

        registry.release(d, v, RunId(1)).unwrap();
        registry.start_maintenance(v).unwrap();
        assert_eq!(registry.vehicle(v).unwrap().status, ResourceStatus::Maintenance);
        registry.end_maintenance(v).unwrap();
        assert_eq!(registry.vehicle(v).unwrap().status, ResourceStatus::Available);
    }

    #[test]
    fn driver_on_leave_is_not_reserved() {
        let registry = ResourceRegistry::new();
        let d = registry.register_driver("Karim");
        registry.register_vehicle(van(dec!(1500))).unwrap();
        registry.set_driver_status(d, ResourceStatus::OnLeave).unwrap();

        assert_eq!(
            registry.reserve_any(dec!(10), RunId(1)),
            Err(DispatchError::NoResourceAvailable)
        );
    }

    #[test]
    fn maintenance_due_back_lists_overdue_returns() {
        let registry = ResourceRegistry::new();
        let v = registry.register_vehicle(van(dec!(1500))).unwrap();
        let start = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let back = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        registry.schedule_maintenance(v, start, back).unwrap();
        assert_eq!(registry.maintenance_starting_on(start).len(), 1);
        registry.start_maintenance(v).unwrap();

        assert!(registry.maintenance_due_back(start).is_empty());
        assert_eq!(registry.maintenance_due_back(back), vec![v]);
    }
}
