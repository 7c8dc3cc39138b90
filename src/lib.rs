// Zone KPI dashboard: MapTrack delivery plan summarized per zone.

pub mod config;
pub mod kpi_models;
pub mod loader;
pub mod locale;
pub mod render;
