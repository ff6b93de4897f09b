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

//! Destinations, logistic zones and the tariff book.
//!
//! A tariff is keyed by `(destination, service tier)` and prices a parcel as
//! `base + per_kg × weight + per_m3 × volume`.

use crate::base::DestinationId;
use crate::ledger::round_money;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceTier {
    Standard,
    Express,
    International,
}

impl ServiceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceTier::Standard => "STANDARD",
            ServiceTier::Express => "EXPRESS",
            ServiceTier::International => "INTERNATIONAL",
        }
    }
}

impl fmt::Display for ServiceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logistic zone of a destination. Shared runs are grouped by zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Zone {
    Center,
    East,
    West,
    South,
}

impl Zone {
    /// Days between today and the departure of a new shared run.
    pub fn departure_offset_days(&self) -> i64 {
        match self {
            Zone::Center => 1,
            Zone::East | Zone::West => 2,
            Zone::South => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub id: DestinationId,
    pub name: String,
    pub zone: Zone,
    /// Configured delivery delay for non-express tiers.
    pub delay_days: i64,
    /// Road distance from the hub.
    pub distance_km: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tariff {
    pub base: Decimal,
    pub per_kg: Decimal,
    pub per_m3: Decimal,
}

impl Tariff {
    pub fn new(base: Decimal, per_kg: Decimal) -> Self {
        Self {
            base,
            per_kg,
            per_m3: Decimal::ZERO,
        }
    }

    pub fn with_volume_rate(mut self, per_m3: Decimal) -> Self {
        self.per_m3 = per_m3;
        self
    }

    /// HT price of a parcel.
    pub fn price(&self, weight_kg: Decimal, volume_m3: Decimal) -> Decimal {
        round_money(self.base + self.per_kg * weight_kg + self.per_m3 * volume_m3)
    }
}

/// Delivery delay in days counted from the run departure date.
///
/// Express is distance-banded: strictly below `band_km` delivers in one day,
/// anything further in two. Other tiers use the destination's delay.
pub fn delivery_delay_days(destination: &Destination, tier: ServiceTier, band_km: Decimal) -> i64 {
    match tier {
        ServiceTier::Express if destination.distance_km < band_km => 1,
        ServiceTier::Express => 2,
        ServiceTier::Standard | ServiceTier::International => destination.delay_days,
    }
}

/// Price table lookup.
pub trait TariffBook: Send + Sync {
    fn lookup(&self, destination: DestinationId, tier: ServiceTier) -> Option<Tariff>;
}

#[derive(Debug, Default)]
pub struct InMemoryTariffBook {
    tariffs: DashMap<(DestinationId, ServiceTier), Tariff>,
}

impl InMemoryTariffBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, destination: DestinationId, tier: ServiceTier, tariff: Tariff) {
        self.tariffs.insert((destination, tier), tariff);
    }
}

impl TariffBook for InMemoryTariffBook {
    fn lookup(&self, destination: DestinationId, tier: ServiceTier) -> Option<Tariff> {
        self.tariffs.get(&(destination, tier)).map(|t| *t)
    }
}
