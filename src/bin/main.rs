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

use chrono::NaiveDateTime;
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use parcel_dispatch::{
    ClientId, Config, DestinationId, Engine, ManualClock, ServiceTier, ShipmentRequest, Tariff,
    VehicleSpec, Zone,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

/// Parcel dispatch replay - run shipment requests through the back office
///
/// Loads destinations, tariffs and the fleet, replays a shipment CSV in
/// order and writes every client balance to stdout.
#[derive(Parser, Debug)]
#[command(name = "parcel-dispatch")]
#[command(about = "Replays shipment requests and prints client balances", long_about = None)]
struct Args {
    /// Destinations CSV: name,zone,delay_days,distance_km
    #[arg(long, value_name = "FILE")]
    destinations: PathBuf,

    /// Tariffs CSV: destination,tier,base,per_kg,per_m3
    #[arg(long, value_name = "FILE")]
    tariffs: PathBuf,

    /// Fleet CSV: kind,name,capacity_kg,capacity_m3,avg_consumption,odometer_km
    #[arg(long, value_name = "FILE")]
    fleet: PathBuf,

    /// Shipments CSV: at,client,destination,tier,weight_kg,volume_m3
    ///
    /// Example: parcel-dispatch --destinations d.csv --tariffs t.csv --fleet f.csv shipments.csv > balances.csv
    #[arg(value_name = "FILE")]
    shipments: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parcel_dispatch=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_env();
    let clock = Arc::new(ManualClock::new(NaiveDateTime::MIN));
    let engine = Engine::new(config, clock.clone());

    let destinations = match open(&args.destinations)
        .and_then(|f| load_destinations(&engine, f).map_err(|e| e.to_string()))
    {
        Ok(destinations) => destinations,
        Err(e) => fail(&format!("Error loading destinations: {e}")),
    };
    if let Err(e) = open(&args.tariffs)
        .and_then(|f| load_tariffs(&engine, &destinations, f).map_err(|e| e.to_string()))
    {
        fail(&format!("Error loading tariffs: {e}"));
    }
    if let Err(e) = open(&args.fleet).and_then(|f| load_fleet(&engine, f).map_err(|e| e.to_string()))
    {
        fail(&format!("Error loading fleet: {e}"));
    }

    let replay = Replay {
        engine: &engine,
        clock: &clock,
        destinations: &destinations,
    };
    if let Err(e) = open(&args.shipments).and_then(|f| replay.run(f).map_err(|e| e.to_string())) {
        fail(&format!("Error replaying shipments: {e}"));
    }

    if let Err(e) = write_balances(&engine, std::io::stdout()) {
        fail(&format!("Error writing output: {e}"));
    }
}

fn fail(message: &str) -> ! {
    tracing::error!("{message}");
    process::exit(1);
}

fn open(path: &Path) -> Result<BufReader<File>, String> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| format!("cannot open '{}': {e}", path.display()))
}

fn rows<R: Read, T: DeserializeOwned>(reader: R) -> impl Iterator<Item = Result<T, csv::Error>> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader)
        .into_deserialize::<T>()
}

#[derive(Debug, Deserialize)]
struct DestinationRecord {
    name: String,
    zone: Zone,
    delay_days: i64,
    distance_km: Decimal,
}

#[derive(Debug, Deserialize)]
struct TariffRecord {
    destination: String,
    tier: ServiceTier,
    base: Decimal,
    per_kg: Decimal,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    per_m3: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct FleetRecord {
    kind: String,
    name: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    capacity_kg: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    capacity_m3: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    avg_consumption: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    odometer_km: Option<Decimal>,
}

/// One shipment request of the replay. `at` uses `%Y-%m-%d %H:%M:%S`.
#[derive(Debug, Deserialize)]
struct ShipmentRecord {
    at: String,
    client: String,
    destination: String,
    tier: ServiceTier,
    weight_kg: Decimal,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    volume_m3: Option<Decimal>,
}

/// Registers destinations and returns their ids by name.
///
/// Reference data is strict: a malformed or rejected row aborts the load.
fn load_destinations<R: Read>(
    engine: &Engine,
    reader: R,
) -> Result<HashMap<String, DestinationId>, Box<dyn std::error::Error>> {
    let mut ids = HashMap::new();
    for record in rows::<R, DestinationRecord>(reader) {
        let record = record?;
        let id = engine.register_destination(
            record.name.clone(),
            record.zone,
            record.delay_days,
            record.distance_km,
        )?;
        ids.insert(record.name, id);
    }
    Ok(ids)
}

fn load_tariffs<R: Read>(
    engine: &Engine,
    destinations: &HashMap<String, DestinationId>,
    reader: R,
) -> Result<(), Box<dyn std::error::Error>> {
    for record in rows::<R, TariffRecord>(reader) {
        let record = record?;
        let destination = destinations
            .get(&record.destination)
            .ok_or_else(|| format!("unknown destination '{}'", record.destination))?;
        let tariff = Tariff::new(record.base, record.per_kg)
            .with_volume_rate(record.per_m3.unwrap_or(Decimal::ZERO));
        engine.set_tariff(*destination, record.tier, tariff)?;
    }
    Ok(())
}

fn load_fleet<R: Read>(engine: &Engine, reader: R) -> Result<(), Box<dyn std::error::Error>> {
    for record in rows::<R, FleetRecord>(reader) {
        let record = record?;
        match record.kind.to_lowercase().as_str() {
            "driver" => {
                engine.register_driver(record.name);
            }
            "vehicle" => {
                let capacity_kg = record
                    .capacity_kg
                    .ok_or_else(|| format!("vehicle '{}' has no weight capacity", record.name))?;
                engine.register_vehicle(VehicleSpec {
                    plate: record.name,
                    capacity_kg,
                    capacity_m3: record.capacity_m3.unwrap_or(Decimal::ZERO),
                    avg_consumption: record.avg_consumption.unwrap_or(Decimal::ZERO),
                    odometer_km: record.odometer_km.unwrap_or(Decimal::ZERO),
                })?;
            }
            other => return Err(format!("unknown fleet kind '{other}'").into()),
        }
    }
    Ok(())
}

struct Replay<'a> {
    engine: &'a Engine,
    clock: &'a ManualClock,
    destinations: &'a HashMap<String, DestinationId>,
}

impl Replay<'_> {
    /// Replays shipment requests in file order.
    ///
    /// The clock follows each row's timestamp and the morning sweep runs
    /// whenever a row opens a new day. Malformed rows and rejected requests
    /// are logged and skipped.
    fn run<R: Read>(&self, reader: R) -> Result<(), csv::Error> {
        let mut clients: HashMap<String, ClientId> = HashMap::new();
        let mut current_day = None;

        for (line, result) in rows::<R, ShipmentRecord>(reader).enumerate() {
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(row = line + 1, error = %e, "skipping malformed row");
                    continue;
                }
            };
            let Ok(at) = NaiveDateTime::parse_from_str(&record.at, "%Y-%m-%d %H:%M:%S") else {
                tracing::warn!(row = line + 1, at = %record.at, "skipping row with bad timestamp");
                continue;
            };
            let Some(destination) = self.destinations.get(&record.destination) else {
                tracing::warn!(row = line + 1, destination = %record.destination, "skipping row with unknown destination");
                continue;
            };

            self.clock.set(at);
            if current_day.is_some_and(|day| day < at.date()) {
                if let Err(e) = self.engine.sweeper().morning_sweep() {
                    tracing::warn!(error = %e, "morning sweep failed");
                }
            }
            current_day = Some(at.date());

            let client = match clients.get(&record.client) {
                Some(id) => *id,
                None => match self.engine.register_client(record.client.clone(), None, None) {
                    Ok(id) => {
                        clients.insert(record.client.clone(), id);
                        id
                    }
                    Err(e) => {
                        tracing::warn!(row = line + 1, error = %e, "skipping row with bad client");
                        continue;
                    }
                },
            };

            let request = ShipmentRequest {
                client,
                origin: "HUB".into(),
                destination: *destination,
                tier: record.tier,
                weight_kg: record.weight_kg,
                volume_m3: record.volume_m3.unwrap_or(Decimal::ZERO),
            };
            match self.engine.create_shipment(request) {
                Ok(receipt) if receipt.assignment.is_none() => {
                    tracing::info!(row = line + 1, shipment = %receipt.shipment, "shipment waiting for a run");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(row = line + 1, error = %e, "skipping rejected shipment");
                }
            }
        }
        Ok(())
    }
}

/// Writes one `client,name,balance` row per client, ordered by client id.
fn write_balances<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for account in engine.accounts() {
        wtr.serialize(account.as_ref())?;
    }
    wtr.flush()?;
    Ok(())
}
