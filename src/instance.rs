//! Module for parsing and representing CEVRP instances.
//!
//! This module handles the EVRP-LIB format files used for the Capacitated
//! Electric Vehicle Routing Problem. It reads the metadata header, node
//! coordinates, demands, charging station ids and the depot section.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Node id convention used by the EVRP-LIB files: the depot is always "1".
pub const DEPOT_KEY: &str = "1";

/// Represents a complete CEVRP instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CevrpInstance {
    /// Name of the instance (file stem)
    pub name: String,
    /// Comment/description
    pub comment: String,
    /// Instance type (e.g. EVRP)
    pub instance_type: String,
    /// Best known objective value, if the file records one
    pub optimal_value: f64,
    /// Fleet size
    pub vehicles: usize,
    /// Number of nodes excluding charging stations (depot + customers)
    pub dimension: usize,
    /// Number of charging stations
    pub stations: usize,
    /// Vehicle cargo capacity
    pub capacity: i32,
    /// Battery capacity
    pub energy_capacity: f64,
    /// Energy consumed per unit distance
    pub energy_consumption: f64,
    /// Edge weight format declared by the file
    pub edge_weight_format: String,
    /// All node coordinates in file order: (id, x, y)
    pub node_coords: Vec<(String, f64, f64)>,
    /// Demand per node id
    pub demands: HashMap<String, i32>,
    /// Charging station ids
    pub charging_stations: Vec<String>,
    /// Depot ids (a single entry for the instances we handle)
    pub depot_section: Vec<String>,
}

impl CevrpInstance {
    /// Parse a CEVRP instance from an EVRP-LIB format file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Cannot open file: {}", e))?;

        let name = path
            .as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string());

        Self::parse(&content, &name)
    }

    /// Parse an instance from its textual content
    pub fn parse(content: &str, name: &str) -> Result<Self, String> {
        let mut header: HashMap<String, String> = HashMap::new();
        let mut node_coords: Vec<(String, f64, f64)> = Vec::new();
        let mut demands: HashMap<String, i32> = HashMap::new();
        let mut charging_stations: Vec<String> = Vec::new();
        let mut depot_section: Vec<String> = Vec::new();

        let mut section = "";

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line == "EOF" {
                continue;
            }

            if line.ends_with("SECTION") {
                section = match line {
                    "NODE_COORD_SECTION" => "coords",
                    "DEMAND_SECTION" => "demands",
                    "STATIONS_COORD_SECTION" => "stations",
                    "DEPOT_SECTION" => "depot",
                    other => return Err(format!("Unknown section marker: {}", other)),
                };
                continue;
            }

            match section {
                "coords" => {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    if parts.len() < 3 {
                        return Err(format!("Malformed coordinate row: {}", line));
                    }
                    let x: f64 = parts[1]
                        .parse()
                        .map_err(|_| format!("Invalid x coordinate: {}", parts[1]))?;
                    let y: f64 = parts[2]
                        .parse()
                        .map_err(|_| format!("Invalid y coordinate: {}", parts[2]))?;
                    node_coords.push((parts[0].to_string(), x, y));
                }
                "demands" => {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    if parts.len() < 2 {
                        return Err(format!("Malformed demand row: {}", line));
                    }
                    let demand: i32 = parts[1]
                        .parse()
                        .map_err(|_| format!("Invalid demand: {}", parts[1]))?;
                    demands.insert(parts[0].to_string(), demand);
                }
                "stations" => {
                    charging_stations.push(line.to_string());
                }
                "depot" => {
                    // The section is terminated by -1 in some files
                    if line != "-1" {
                        depot_section.push(line.to_string());
                    }
                }
                _ => {
                    // KEY: VALUE header line
                    let (key, value) = line
                        .split_once(':')
                        .ok_or_else(|| format!("Malformed header line: {}", line))?;
                    header.insert(key.trim().to_string(), value.trim().to_string());
                }
            }
        }

        let dimension: usize = header
            .get("DIMENSION")
            .ok_or("Missing DIMENSION key")?
            .parse()
            .map_err(|_| "Invalid DIMENSION")?;
        let capacity: i32 = header
            .get("CAPACITY")
            .ok_or("Missing CAPACITY key")?
            .parse()
            .map_err(|_| "Invalid CAPACITY")?;
        let energy_capacity: f64 = header
            .get("ENERGY_CAPACITY")
            .ok_or("Missing ENERGY_CAPACITY key")?
            .parse()
            .map_err(|_| "Invalid ENERGY_CAPACITY")?;
        let energy_consumption: f64 = header
            .get("ENERGY_CONSUMPTION")
            .ok_or("Missing ENERGY_CONSUMPTION key")?
            .parse()
            .map_err(|_| "Invalid ENERGY_CONSUMPTION")?;

        if node_coords.is_empty() {
            return Err("Missing NODE_COORD_SECTION".to_string());
        }

        let vehicles: usize = header
            .get("VEHICLES")
            .map(|v| v.parse().map_err(|_| "Invalid VEHICLES"))
            .transpose()?
            .unwrap_or(1);
        let stations: usize = header
            .get("STATIONS")
            .map(|v| v.parse().map_err(|_| "Invalid STATIONS"))
            .transpose()?
            .unwrap_or(charging_stations.len());
        let optimal_value: f64 = header
            .get("OPTIMAL_VALUE")
            .map(|v| v.parse().map_err(|_| "Invalid OPTIMAL_VALUE"))
            .transpose()?
            .unwrap_or(0.0);

        Ok(CevrpInstance {
            name: name.to_string(),
            comment: header.get("COMMENT").cloned().unwrap_or_default(),
            instance_type: header.get("TYPE").cloned().unwrap_or_default(),
            optimal_value,
            vehicles,
            dimension,
            stations,
            capacity,
            energy_capacity,
            energy_consumption,
            edge_weight_format: header.get("EDGE_WEIGHT_FORMAT").cloned().unwrap_or_default(),
            node_coords,
            demands,
            charging_stations,
            depot_section,
        })
    }

    /// The depot id: first DEPOT_SECTION entry, falling back to the "1"
    /// convention when the section is absent.
    pub fn depot_key(&self) -> &str {
        self.depot_section
            .first()
            .map(|s| s.as_str())
            .unwrap_or(DEPOT_KEY)
    }

    /// Check whether a node id is a charging station
    pub fn is_station_key(&self, key: &str) -> bool {
        self.charging_stations.iter().any(|s| s == key)
    }

    /// Number of customers (nodes that are neither depot nor stations)
    pub fn num_customers(&self) -> usize {
        self.node_coords
            .iter()
            .filter(|(key, _, _)| key != self.depot_key() && !self.is_station_key(key))
            .count()
    }

    /// Get statistics about the instance
    pub fn statistics(&self) -> InstanceStatistics {
        let num_customers = self.num_customers();
        let total_demand: i32 = self
            .node_coords
            .iter()
            .filter(|(key, _, _)| key != self.depot_key() && !self.is_station_key(key))
            .map(|(key, _, _)| self.demands.get(key).copied().unwrap_or(0))
            .sum();

        let max_demand = self
            .demands
            .values()
            .copied()
            .max()
            .unwrap_or(0);

        // Lower bound on fleet usage implied by capacity alone
        let min_vehicles = if self.capacity > 0 {
            ((total_demand as f64) / (self.capacity as f64)).ceil() as usize
        } else {
            0
        };

        InstanceStatistics {
            name: self.name.clone(),
            num_customers,
            num_stations: self.charging_stations.len(),
            vehicles: self.vehicles,
            capacity: self.capacity,
            energy_capacity: self.energy_capacity,
            energy_consumption: self.energy_consumption,
            total_demand,
            max_demand,
            min_vehicles,
            optimal_value: self.optimal_value,
        }
    }
}

/// Statistics about a CEVRP instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub name: String,
    pub num_customers: usize,
    pub num_stations: usize,
    pub vehicles: usize,
    pub capacity: i32,
    pub energy_capacity: f64,
    pub energy_consumption: f64,
    pub total_demand: i32,
    pub max_demand: i32,
    pub min_vehicles: usize,
    pub optimal_value: f64,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Instance: {}", self.name)?;
        writeln!(
            f,
            "  Nodes: {} (1 depot + {} customers + {} stations)",
            1 + self.num_customers + self.num_stations,
            self.num_customers,
            self.num_stations
        )?;
        writeln!(f, "  Fleet: {} vehicles", self.vehicles)?;
        writeln!(f, "  Cargo capacity: {}", self.capacity)?;
        writeln!(f, "  Battery capacity: {}", self.energy_capacity)?;
        writeln!(f, "  Consumption rate: {}", self.energy_consumption)?;
        writeln!(f, "  Total demand: {}", self.total_demand)?;
        writeln!(f, "  Max single demand: {}", self.max_demand)?;
        writeln!(f, "  Capacity-implied min vehicles: {}", self.min_vehicles)?;
        if self.optimal_value > 0.0 {
            writeln!(f, "  Best known value: {:.2}", self.optimal_value)?;
        }
        Ok(())
    }
}
