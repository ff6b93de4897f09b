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

//! Engine configuration.
//!
//! # Environment variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | PARCEL_TAX_RATE | 0.19 | TVA rate applied to invoice HT |
//! | PARCEL_PAYMENT_TERMS_DAYS | 60 | Invoice due date offset |
//! | PARCEL_EXPRESS_CUTOFF_HOUR | 17 | Last hour an express run departs the same day |
//! | PARCEL_EXPRESS_LEAD_MINUTES | 60 | Express departure delay before the cutoff |
//! | PARCEL_FIRST_DEPARTURE_HOUR | 8 | Next-day express departure hour |
//! | PARCEL_SHARED_DEPARTURE_HOUR | 9 | Departure hour of shared runs |
//! | PARCEL_EXPRESS_DISTANCE_BAND_KM | 500 | Express 1-day / 2-day distance boundary |

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// TVA rate, e.g. `0.19` for 19%.
    pub tax_rate: Decimal,
    pub payment_terms_days: i64,
    pub express_cutoff_hour: u32,
    pub express_lead_minutes: i64,
    pub first_departure_hour: u32,
    pub shared_departure_hour: u32,
    pub express_distance_band_km: Decimal,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tax_rate: dec!(0.19),
            payment_terms_days: 60,
            express_cutoff_hour: 17,
            express_lead_minutes: 60,
            first_departure_hour: 8,
            shared_departure_hour: 9,
            express_distance_band_km: dec!(500),
        }
    }
}

impl Config {
    /// Loads configuration from the environment, falling back to defaults
    /// for unset or unparsable variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tax_rate: env_or("PARCEL_TAX_RATE", defaults.tax_rate),
            payment_terms_days: env_or("PARCEL_PAYMENT_TERMS_DAYS", defaults.payment_terms_days),
            express_cutoff_hour: env_or("PARCEL_EXPRESS_CUTOFF_HOUR", defaults.express_cutoff_hour),
            express_lead_minutes: env_or(
                "PARCEL_EXPRESS_LEAD_MINUTES",
                defaults.express_lead_minutes,
            ),
            first_departure_hour: env_or(
                "PARCEL_FIRST_DEPARTURE_HOUR",
                defaults.first_departure_hour,
            ),
            shared_departure_hour: env_or(
                "PARCEL_SHARED_DEPARTURE_HOUR",
                defaults.shared_departure_hour,
            ),
            express_distance_band_km: env_or(
                "PARCEL_EXPRESS_DISTANCE_BAND_KM",
                defaults.express_distance_band_km,
            ),
        }
    }

    /// Overrides the tax rate. Mostly used by tests.
    pub fn with_tax_rate(mut self, tax_rate: Decimal) -> Self {
        self.tax_rate = tax_rate;
        self
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tax_rate_is_nineteen_percent() {
        assert_eq!(Config::default().tax_rate, dec!(0.19));
        assert_eq!(Config::default().payment_terms_days, 60);
    }

    #[test]
    fn unparsable_values_fall_back() {
        assert_eq!(env_or("PARCEL_TEST_UNSET_VARIABLE", 42u32), 42);
    }

    #[test]
    fn with_tax_rate_overrides() {
        let config = Config::default().with_tax_rate(dec!(0.07));
        assert_eq!(config.tax_rate, dec!(0.07));
    }
}
