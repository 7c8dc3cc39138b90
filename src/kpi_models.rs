// Data model, feed access and KPI aggregation for the MapTrack delivery plan.
// Feed: MapTrack CSV, one row per planned delivery (zone, vehicle, client, route, kg, city, ...)
//
// Everything in here except `HttpFeed` is pure: text in, report out.

use bytes::Bytes;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{BusinessRules, ColumnLayout, KpiConfig};
use crate::locale;

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, Error)]
pub enum KpiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Feed request failed with status: {0}")]
    Http(u16),
    #[error("Feed body is not text: {0}")]
    Body(String),
    #[error("No records found in feed")]
    NoRecords,
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, KpiError>;

// ============================================================================
// Data Structures
// ============================================================================

/// One data line of the feed split on commas, unvalidated.
pub type RawRecord = Vec<String>;

/// A zone-filtered row reduced to the fields the KPIs use.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub vehicle: String,
    pub client: String,
    pub route: String,
    pub city: String,
    pub weight_kg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFormat {
    Whole,
    OneDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiMetric {
    pub label: &'static str,
    pub value: f64,
    pub format: MetricFormat,
}

impl KpiMetric {
    pub fn display_value(&self) -> String {
        match self.format {
            MetricFormat::Whole => locale::format_number(self.value, 0),
            MetricFormat::OneDecimal => locale::format_number(self.value, 1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiSummary {
    pub total_weight_kg: f64,
    pub distinct_clients: usize,
    pub distinct_vehicles: usize,
    pub kg_per_vehicle: f64,
    pub clients_per_vehicle: f64,
    pub kg_per_client: f64,
}

impl KpiSummary {
    /// The six dashboard cards, in display order.
    pub fn metrics(&self) -> [KpiMetric; 6] {
        [
            KpiMetric { label: "Kg Planificados", value: self.total_weight_kg, format: MetricFormat::Whole },
            KpiMetric { label: "N° Clientes", value: self.distinct_clients as f64, format: MetricFormat::Whole },
            KpiMetric { label: "N° Unidades", value: self.distinct_vehicles as f64, format: MetricFormat::Whole },
            KpiMetric { label: "Kg/Vehículo", value: self.kg_per_vehicle, format: MetricFormat::Whole },
            KpiMetric { label: "Clientes/Vehículo", value: self.clients_per_vehicle, format: MetricFormat::OneDecimal },
            KpiMetric { label: "Kg/Cliente", value: self.kg_per_client, format: MetricFormat::Whole },
        ]
    }
}

/// Running totals for one city or route.
#[derive(Debug, Clone, Default)]
pub struct GroupBucket {
    pub weight_kg: f64,
    pub clients: HashSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub key: String,
    pub weight_kg: f64,
    pub clients: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiReport {
    pub zone: String,
    pub records: usize,
    pub summary: KpiSummary,
    pub by_city: Vec<GroupRow>,
    pub by_route: Vec<GroupRow>,
}

// ============================================================================
// Parsing
// ============================================================================

/// Data rows of the feed, header already dropped.
#[derive(Debug, Clone, Default)]
pub struct FeedTable {
    pub rows: Vec<RawRecord>,
}

impl FeedTable {
    /// Splits the feed on '\n', ignoring blank lines, and drops the header.
    ///
    /// Fields are split on every comma: quoted fields are not supported.
    pub fn parse(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text
            .split('\n')
            .filter(|l| !l.trim().is_empty())
            .collect();

        if lines.len() <= 1 {
            return Err(KpiError::NoRecords);
        }

        let body = lines[1..].join("\n");
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_reader(body.as_bytes());

        let mut rows = Vec::with_capacity(lines.len() - 1);
        for result in rdr.records() {
            match result {
                Ok(record) => rows.push(record.iter().map(str::to_string).collect()),
                Err(e) => {
                    // only invalid UTF-8 can fail here, and the body is already a str
                    warn!("⚠️  Skipping unreadable feed line: {}", e);
                }
            }
        }

        debug!("Parsed {} data rows from feed", rows.len());
        Ok(FeedTable { rows })
    }

    /// Rows wide enough to hold a weight whose trimmed zone equals `zone` exactly.
    pub fn filter_zone(&self, zone: &str, columns: &ColumnLayout) -> Vec<RawRecord> {
        self.rows
            .iter()
            .filter(|r| r.len() > columns.weight && field(r, columns.zone) == zone)
            .cloned()
            .collect()
    }
}

fn field(record: &[String], index: usize) -> &str {
    record.get(index).map(|s| s.trim()).unwrap_or("")
}

/// Reads a kilogram figure written with a decimal comma ("1234,5").
///
/// Like a lenient float parser, a numeric prefix is accepted ("12 kg" -> 12);
/// anything else, or a non-finite result, is 0.
pub fn parse_weight(raw: &str) -> f64 {
    let normalized = raw.trim().replacen(',', ".", 1);
    let value = match normalized.parse::<f64>() {
        Ok(v) => v,
        Err(_) => leading_number(&normalized)
            .and_then(|prefix| prefix.parse::<f64>().ok())
            .unwrap_or(0.0),
    };
    if value.is_finite() { value } else { 0.0 }
}

fn leading_number(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if digits > 0 || frac_end > frac_start {
            digits += frac_end - frac_start;
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    Some(&s[..end])
}

impl Delivery {
    pub fn from_record(record: &[String], columns: &ColumnLayout) -> Self {
        Delivery {
            vehicle: field(record, columns.vehicle).to_string(),
            client: field(record, columns.client).to_string(),
            route: field(record, columns.route).to_string(),
            city: field(record, columns.city).to_string(),
            weight_kg: parse_weight(record.get(columns.weight).map(String::as_str).unwrap_or("")),
        }
    }
}

// ============================================================================
// Aggregation
// ============================================================================

fn ratio(numerator: f64, divisor: usize) -> f64 {
    if divisor == 0 { 0.0 } else { numerator / divisor as f64 }
}

/// Groups deliveries by `key`, keeping first-seen order until the final sort.
fn group_by<'a, I, K>(deliveries: I, key: K, fallback: &str) -> Vec<GroupRow>
where
    I: IntoIterator<Item = &'a Delivery>,
    K: Fn(&Delivery) -> &str,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<(String, GroupBucket)> = Vec::new();

    for d in deliveries {
        let name = match key(d) {
            "" => fallback,
            k => k,
        };
        let slot = match index.get(name) {
            Some(&i) => i,
            None => {
                index.insert(name.to_string(), buckets.len());
                buckets.push((name.to_string(), GroupBucket::default()));
                buckets.len() - 1
            }
        };
        let bucket = &mut buckets[slot].1;
        bucket.weight_kg += d.weight_kg;
        if !d.client.is_empty() {
            bucket.clients.insert(d.client.clone());
        }
    }

    let mut rows: Vec<GroupRow> = buckets
        .into_iter()
        .map(|(key, bucket)| GroupRow {
            key,
            weight_kg: bucket.weight_kg,
            clients: bucket.clients.len(),
        })
        .collect();
    // stable: equal weights keep first-seen order
    rows.sort_by(|a, b| b.weight_kg.total_cmp(&a.weight_kg));
    rows
}

impl KpiReport {
    pub fn compute(zone: &str, deliveries: &[Delivery], rules: &BusinessRules) -> Self {
        let weighted: Vec<&Delivery> = deliveries
            .iter()
            .filter(|d| rules.counts_weight(&d.vehicle))
            .collect();

        let total_weight_kg = weighted.iter().fold(0.0, |acc, d| acc + d.weight_kg);

        let clients: HashSet<&str> = deliveries
            .iter()
            .map(|d| d.client.as_str())
            .filter(|c| !c.is_empty())
            .collect();

        let vehicles: HashSet<&str> = deliveries
            .iter()
            .filter(|d| rules.counts_as_unit(&d.vehicle))
            .map(|d| d.vehicle.as_str())
            .filter(|v| !v.is_empty())
            .collect();

        let distinct_clients = clients.len();
        let distinct_vehicles = vehicles.len();

        let summary = KpiSummary {
            total_weight_kg,
            distinct_clients,
            distinct_vehicles,
            kg_per_vehicle: ratio(total_weight_kg, distinct_vehicles),
            clients_per_vehicle: ratio(distinct_clients as f64, distinct_vehicles),
            kg_per_client: ratio(total_weight_kg, distinct_clients),
        };

        KpiReport {
            zone: zone.to_string(),
            records: deliveries.len(),
            summary,
            by_city: group_by(weighted.iter().copied(), |d| d.city.as_str(), &rules.no_city_label),
            by_route: group_by(weighted.iter().copied(), |d| d.route.as_str(), &rules.no_route_label),
        }
    }

    /// Feed text to report, returning the zone-filtered raw rows alongside.
    pub fn from_feed_text(text: &str, zone: &str, config: &KpiConfig) -> Result<(Self, Vec<RawRecord>)> {
        let table = FeedTable::parse(text)?;
        Ok(Self::from_table(&table, zone, config))
    }

    pub fn from_table(table: &FeedTable, zone: &str, config: &KpiConfig) -> (Self, Vec<RawRecord>) {
        let zone_rows = table.filter_zone(zone, &config.columns);
        let deliveries: Vec<Delivery> = zone_rows
            .iter()
            .map(|r| Delivery::from_record(r, &config.columns))
            .collect();

        info!(
            "📊 Zone '{}': {} of {} rows selected",
            zone,
            deliveries.len(),
            table.rows.len()
        );
        (Self::compute(zone, &deliveries, &config.rules), zone_rows)
    }
}

// ============================================================================
// Feed Access
// ============================================================================

/// Where the raw CSV text comes from.
pub trait FeedSource {
    fn fetch_text(&self) -> impl Future<Output = Result<String>> + Send;
}

pub struct HttpFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpFeed {
    pub fn new(config: &KpiConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| KpiError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpFeed {
            client,
            url: config.feed_url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FeedSource for HttpFeed {
    async fn fetch_text(&self) -> Result<String> {
        debug!("Fetching feed from {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| KpiError::Network(format!("Failed to fetch feed: {}", e)))?;

        if !response.status().is_success() {
            return Err(KpiError::Http(response.status().as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| KpiError::Network(format!("Failed to read feed response: {}", e)))?;

        decode_body(body)
    }
}

pub fn decode_body(body: Bytes) -> Result<String> {
    String::from_utf8(body.to_vec()).map_err(|e| KpiError::Body(e.to_string()))
}

// ============================================================================
// Diagnostic Snapshot
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub zone: String,
    pub captured_at: i64,
    pub rows: Vec<RawRecord>,
}

/// Last zone-filtered dataset, kept for inspection only.
#[derive(Debug, Clone, Default)]
pub struct DebugSnapshot {
    inner: Arc<Mutex<Option<Snapshot>>>,
}

impl DebugSnapshot {
    pub fn store(&self, zone: &str, rows: Vec<RawRecord>) {
        match self.inner.lock() {
            Ok(mut slot) => {
                *slot = Some(Snapshot {
                    zone: zone.to_string(),
                    captured_at: chrono::Utc::now().timestamp(),
                    rows,
                });
            }
            Err(e) => error!("❌ Failed to lock debug snapshot: {}", e),
        }
    }

    pub fn latest(&self) -> Option<Snapshot> {
        match self.inner.lock() {
            Ok(slot) => slot.clone(),
            Err(e) => {
                error!("❌ Failed to lock debug snapshot: {}", e);
                None
            }
        }
    }
}
