// One dashboard load: resolve targets, fetch, compute, render.

use tracing::{error, info};

use crate::config::KpiConfig;
use crate::kpi_models::{DebugSnapshot, FeedSource, FeedTable, KpiError, KpiReport, Result};
use crate::locale;
use crate::render::KpiView;

pub const STATUS_LOADING: &str = "Cargando datos de la zona seleccionada...";
pub const STATUS_NO_RECORDS: &str = "No se encontraron registros en el archivo.";
pub const STATUS_DONE: &str = "Resumen calculado para la zona activa.";
pub const STATUS_ERROR: &str = "Error al cargar los datos.";
pub const UPDATED_PREFIX: &str = "Actualizado: ";

/// The external collaborator that knows which zone is active.
pub trait ZoneSelector {
    fn current_zone(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct FixedZone(pub String);

impl ZoneSelector for FixedZone {
    fn current_zone(&self) -> String {
        self.0.clone()
    }
}

/// Fetches the feed and fills `view`. All failures end up as status text.
pub async fn load_kpi<F, Z, V>(
    feed: &F,
    zones: &Z,
    view: &mut V,
    config: &KpiConfig,
    snapshot: &DebugSnapshot,
) where
    F: FeedSource,
    Z: ZoneSelector + ?Sized,
    V: KpiView,
{
    let zone = zones.current_zone();

    if !view.resolve_targets() {
        return;
    }

    view.set_status(STATUS_LOADING);
    view.set_cards(&[]);
    view.set_city_rows(&[]);
    view.set_route_rows(&[]);
    view.set_updated("-");

    match populate(feed, &zone, view, config, snapshot).await {
        Ok(()) => {}
        Err(KpiError::NoRecords) => {
            info!("ℹ️  Feed has no data rows");
            view.set_status(STATUS_NO_RECORDS);
        }
        Err(e) => {
            error!("❌ Failed to load KPIs for zone '{}': {}", zone, e);
            view.set_status(STATUS_ERROR);
        }
    }
}

async fn populate<F, V>(
    feed: &F,
    zone: &str,
    view: &mut V,
    config: &KpiConfig,
    snapshot: &DebugSnapshot,
) -> Result<()>
where
    F: FeedSource,
    V: KpiView,
{
    let text = feed.fetch_text().await?;
    let table = FeedTable::parse(&text)?;
    let tz = config.tz()?;

    let (report, zone_rows) = KpiReport::from_table(&table, zone, config);
    snapshot.store(zone, zone_rows);

    view.set_cards(&report.summary.metrics());
    view.set_city_rows(&report.by_city);
    view.set_route_rows(&report.by_route);

    view.set_status(STATUS_DONE);
    view.set_updated(&format!("{}{}", UPDATED_PREFIX, locale::format_timestamp(&locale::now_in(tz))));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi_models::{GroupRow, KpiMetric};
    use crate::render::{HtmlPage, Target};

    const HEADER: &str = "id,zona,vehiculo,cliente,c4,c5,ruta,c7,c8,c9,kg,c11,c12,c13,ciudad";
    const TEMPLATE: &str = "{{kpi-subtitle}}|{{kpi-cards}}|{{table-ciudad}}|{{table-ruta}}|{{kpi-updated}}";

    struct StaticFeed(Result<String>);

    impl FeedSource for StaticFeed {
        async fn fetch_text(&self) -> Result<String> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(KpiError::Network(e.to_string())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingView {
        available: bool,
        status: Vec<String>,
        cards: Option<Vec<KpiMetric>>,
        cities: Option<Vec<GroupRow>>,
        routes: Option<Vec<GroupRow>>,
        updated: Option<String>,
    }

    impl KpiView for RecordingView {
        fn resolve_targets(&mut self) -> bool {
            self.available
        }
        fn set_status(&mut self, text: &str) {
            self.status.push(text.to_string());
        }
        fn set_updated(&mut self, text: &str) {
            self.updated = Some(text.to_string());
        }
        fn set_cards(&mut self, metrics: &[KpiMetric]) {
            self.cards = Some(metrics.to_vec());
        }
        fn set_city_rows(&mut self, rows: &[GroupRow]) {
            self.cities = Some(rows.to_vec());
        }
        fn set_route_rows(&mut self, rows: &[GroupRow]) {
            self.routes = Some(rows.to_vec());
        }
    }

    fn feed(lines: &[&str]) -> StaticFeed {
        StaticFeed(Ok(lines.join("\n")))
    }

    #[tokio::test]
    async fn missing_targets_is_a_silent_no_op() {
        let mut view = RecordingView::default();
        let snapshot = DebugSnapshot::default();
        load_kpi(&feed(&[HEADER]), &FixedZone("A".into()), &mut view, &KpiConfig::default(), &snapshot).await;
        assert!(view.status.is_empty());
        assert!(view.cards.is_none());
        assert!(snapshot.latest().is_none());
    }

    #[tokio::test]
    async fn header_only_feed_shows_no_records() {
        let mut page = HtmlPage::new(TEMPLATE, "A");
        load_kpi(&feed(&[HEADER, ""]), &FixedZone("A".into()), &mut page, &KpiConfig::default(), &DebugSnapshot::default()).await;
        assert_eq!(page.content(Target::Subtitle), STATUS_NO_RECORDS);
        assert_eq!(page.content(Target::Cards), "");
        assert_eq!(page.content(Target::CityTable), "");
        assert_eq!(page.content(Target::RouteTable), "");
        assert_eq!(page.content(Target::Updated), "-");
    }

    #[tokio::test]
    async fn fetch_failure_shows_generic_error() {
        let failing = StaticFeed(Err(KpiError::Http(503)));
        let mut view = RecordingView { available: true, ..Default::default() };
        load_kpi(&failing, &FixedZone("A".into()), &mut view, &KpiConfig::default(), &DebugSnapshot::default()).await;
        assert_eq!(view.status, vec![STATUS_LOADING.to_string(), STATUS_ERROR.to_string()]);
        assert_eq!(view.cards, Some(vec![]));
        assert_eq!(view.cities, Some(vec![]));
        assert_eq!(view.routes, Some(vec![]));
        assert_eq!(view.updated.as_deref(), Some("-"));
    }

    #[tokio::test]
    async fn bad_timezone_is_caught() {
        let config = KpiConfig { timezone: "Nowhere/Land".to_string(), ..KpiConfig::default() };
        let mut view = RecordingView { available: true, ..Default::default() };
        let rows = ["1,A,V1,C1,x,x,R1,x,x,x,10,x,x,x,Lima"];
        let lines: Vec<&str> = std::iter::once(HEADER).chain(rows).collect();
        load_kpi(&feed(&lines), &FixedZone("A".into()), &mut view, &config, &DebugSnapshot::default()).await;
        assert_eq!(view.status.last().map(String::as_str), Some(STATUS_ERROR));
    }

    #[tokio::test]
    async fn route_rows_arrive_heaviest_first() {
        let lines = [
            HEADER,
            "1,A,TRK-001,C1,x,x,R-LIGERA,x,x,x,300,x,x,x,Lima",
            "2,A,TRK-002,C2,x,x,,x,x,x,50,x,x,x,Lima",
            "3,A,TRK-003,C3,x,x,R-PESADA,x,x,x,500,x,x,x,Lima",
        ];
        let mut view = RecordingView { available: true, ..Default::default() };
        load_kpi(&feed(&lines), &FixedZone("A".into()), &mut view, &KpiConfig::default(), &DebugSnapshot::default()).await;

        let routes: Vec<(String, f64)> = view
            .routes
            .unwrap()
            .into_iter()
            .map(|r| (r.key, r.weight_kg))
            .collect();
        assert_eq!(
            routes,
            vec![
                ("R-PESADA".to_string(), 500.0),
                ("R-LIGERA".to_string(), 300.0),
                ("Sin ruta".to_string(), 50.0),
            ]
        );
    }

    #[tokio::test]
    async fn successful_load_fills_every_region() {
        let lines = [
            HEADER,
            "1,A,FRT-001,C1,x,x,R1,x,x,x,100,x,x,x,Lima",
            "2,A,TRK-002,C2,x,x,R1,x,x,x,2500,x,x,x,Lima",
            "3,A,TRK-003,C3,x,x,R2,x,x,x,1500,x,x,x,Callao",
            "4,B,TRK-004,C4,x,x,R3,x,x,x,900,x,x,x,Cusco",
        ];
        let snapshot = DebugSnapshot::default();
        let mut page = HtmlPage::new(TEMPLATE, "A");
        load_kpi(&feed(&lines), &FixedZone("A".into()), &mut page, &KpiConfig::default(), &snapshot).await;

        assert_eq!(page.content(Target::Subtitle), STATUS_DONE);
        assert!(page.content(Target::Updated).starts_with(UPDATED_PREFIX));
        assert_eq!(page.content(Target::Cards).matches("mod-card").count(), 6);
        assert!(page.content(Target::Cards).contains("<h2>Kg Planificados</h2>"));
        assert!(page.content(Target::Cards).contains(">4,000</p>"));

        let cities = page.content(Target::CityTable);
        let lima = cities.find("Lima").unwrap();
        let callao = cities.find("Callao").unwrap();
        assert!(lima < callao);
        assert!(!cities.contains("Cusco"));

        // R1 carries 2500 kg (FRT-001 adds nothing), R2 1500 kg
        let routes = page.content(Target::RouteTable);
        assert_eq!(
            routes,
            "<tr><td>R1</td><td>2,500</td><td>1</td></tr>\n<tr><td>R2</td><td>1,500</td><td>1</td></tr>\n"
        );
        assert!(!routes.contains("R3"));

        let latest = snapshot.latest().unwrap();
        assert_eq!(latest.zone, "A");
        assert_eq!(latest.rows.len(), 3);
    }
}
