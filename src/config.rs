// Runtime configuration for the zone KPI dashboard.
//
// Load order: built-in defaults -> JSON file named by KPI_CONFIG -> KPI_* environment variables.
// A `.env` file in the working directory is read first, so its values act as environment overrides.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::{debug, info};

use crate::kpi_models::{KpiError, Result};

pub const DEFAULT_FEED_URL: &str = "https://raw.githubusercontent.com/Gokzarag/RoadMap/main/MapTrack_V2.1.csv";

// ============================================================================
// Column layout of the MapTrack feed (0-based)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnLayout {
    pub zone: usize,
    pub vehicle: usize,
    pub client: usize,
    pub route: usize,
    pub weight: usize,
    pub city: usize,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        ColumnLayout {
            zone: 1,
            vehicle: 2,
            client: 3,
            route: 6,
            weight: 10,
            city: 14,
        }
    }
}

// ============================================================================
// Business rules
// ============================================================================

/// Vehicle identifiers and labels that shape the aggregation.
///
/// `weight_excluded_vehicle` marks reserve/internal traffic: its rows never add weight
/// (neither to the total nor to the city/route tables). `unit_excluded_vehicles` are
/// categories that are not deployable units and so are left out of the vehicle count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessRules {
    pub weight_excluded_vehicle: String,
    pub unit_excluded_vehicles: Vec<String>,
    pub no_city_label: String,
    pub no_route_label: String,
}

impl Default for BusinessRules {
    fn default() -> Self {
        BusinessRules {
            weight_excluded_vehicle: "FRT-001".to_string(),
            unit_excluded_vehicles: vec!["BHP-765".to_string(), "RES-CLI".to_string()],
            no_city_label: "Sin ciudad".to_string(),
            no_route_label: "Sin ruta".to_string(),
        }
    }
}

impl BusinessRules {
    pub fn counts_weight(&self, vehicle: &str) -> bool {
        vehicle != self.weight_excluded_vehicle
    }

    pub fn counts_as_unit(&self, vehicle: &str) -> bool {
        !self.unit_excluded_vehicles.iter().any(|v| v == vehicle)
    }
}

// ============================================================================
// Top-level configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiConfig {
    pub feed_url: String,
    pub columns: ColumnLayout,
    pub rules: BusinessRules,
    /// Zone used when the request does not name one.
    pub default_zone: String,
    /// IANA name; the "Actualizado" line is rendered in this zone.
    pub timezone: String,
    pub host: String,
    pub port: u16,
    /// None leaves the fetch without a client-side timeout.
    pub request_timeout_secs: Option<u64>,
}

impl Default for KpiConfig {
    fn default() -> Self {
        KpiConfig {
            feed_url: DEFAULT_FEED_URL.to_string(),
            columns: ColumnLayout::default(),
            rules: BusinessRules::default(),
            default_zone: String::new(),
            timezone: "America/Lima".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: None,
        }
    }
}

impl KpiConfig {
    /// Builds the configuration from the process environment.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment overrides from {:?}", path);
        }

        let mut config = match std::env::var("KPI_CONFIG") {
            Ok(path) => {
                info!("📄 Reading configuration file {}", path);
                let contents = fs::read_to_string(&path)
                    .map_err(|e| KpiError::Config(format!("Failed to read {}: {}", path, e)))?;
                Self::from_json(&contents)?
            }
            Err(_) => KpiConfig::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents)
            .map_err(|e| KpiError::Config(format!("Invalid configuration file: {}", e)))
    }

    /// Applies `KPI_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("KPI_FEED_URL") {
            self.feed_url = url;
        }
        if let Some(zone) = lookup("KPI_DEFAULT_ZONE") {
            self.default_zone = zone;
        }
        if let Some(tz) = lookup("KPI_TIMEZONE") {
            self.timezone = tz;
        }
        if let Some(host) = lookup("KPI_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("KPI_PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|e| KpiError::Config(format!("KPI_PORT '{}' is not a port: {}", port, e)))?;
        }
        if let Some(secs) = lookup("KPI_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|e| {
                KpiError::Config(format!("KPI_REQUEST_TIMEOUT_SECS '{}' is not a number: {}", secs, e))
            })?;
            self.request_timeout_secs = if secs == 0 { None } else { Some(secs) };
        }
        if let Some(vehicle) = lookup("KPI_WEIGHT_EXCLUDED_VEHICLE") {
            self.rules.weight_excluded_vehicle = vehicle.trim().to_string();
        }
        if let Some(list) = lookup("KPI_UNIT_EXCLUDED_VEHICLES") {
            self.rules.unit_excluded_vehicles = list
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(label) = lookup("KPI_NO_CITY_LABEL") {
            self.rules.no_city_label = label;
        }
        if let Some(label) = lookup("KPI_NO_ROUTE_LABEL") {
            self.rules.no_route_label = label;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.feed_url.trim().is_empty() {
            return Err(KpiError::Config("feed_url must not be empty".to_string()));
        }
        self.tz()?;
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| KpiError::Config(format!("Unknown timezone '{}': {}", self.timezone, e)))
    }
}
