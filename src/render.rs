// Output targets of the dashboard and the HTML page that provides them.

use html_escape::{encode_double_quoted_attribute, encode_text};
use std::borrow::Cow;
use std::collections::HashMap;

use crate::kpi_models::{GroupRow, KpiMetric};
use crate::locale;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Subtitle,
    Cards,
    CityTable,
    RouteTable,
    Updated,
}

impl Target {
    pub const ALL: [Target; 5] = [
        Target::Subtitle,
        Target::Cards,
        Target::CityTable,
        Target::RouteTable,
        Target::Updated,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Target::Subtitle => "kpi-subtitle",
            Target::Cards => "kpi-cards",
            Target::CityTable => "table-ciudad",
            Target::RouteTable => "table-ruta",
            Target::Updated => "kpi-updated",
        }
    }

    fn placeholder(self) -> String {
        format!("{{{{{}}}}}", self.id())
    }
}

/// A display surface with the five dashboard regions.
///
/// Text setters take plain text; the view is responsible for escaping it.
pub trait KpiView {
    /// Looks up every region. `false` means the dashboard is not shown and nothing is written.
    fn resolve_targets(&mut self) -> bool;
    fn set_status(&mut self, text: &str);
    fn set_updated(&mut self, text: &str);
    fn set_cards(&mut self, metrics: &[KpiMetric]);
    fn set_city_rows(&mut self, rows: &[GroupRow]);
    fn set_route_rows(&mut self, rows: &[GroupRow]);
}

pub fn card_html(metric: &KpiMetric) -> String {
    format!(
        "\n      <div class=\"mod-card\">\n        <h2>{}</h2>\n        <p style=\"font-size:22px;font-weight:700;margin-top:2px;\">{}</p>\n      </div>\n    ",
        encode_text(metric.label),
        encode_text(&metric.display_value()),
    )
}

pub fn row_html(row: &GroupRow) -> String {
    format!(
        "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
        encode_text(&row.key),
        locale::format_number(row.weight_kg, 0),
        row.clients,
    )
}

/// Server-rendered page. Regions are `{{id}}` placeholders in the template.
#[derive(Debug, Clone)]
pub struct HtmlPage {
    template: String,
    zone: String,
    contents: HashMap<Target, String>,
}

impl HtmlPage {
    pub fn new(template: impl Into<String>, zone: &str) -> Self {
        HtmlPage {
            template: template.into(),
            zone: zone.to_string(),
            contents: HashMap::new(),
        }
    }

    /// Current inner HTML of a region.
    pub fn content(&self, target: Target) -> &str {
        self.contents.get(&target).map(String::as_str).unwrap_or("")
    }

    /// Fills every placeholder in one pass over the template; inserted content is never rescanned.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}").and_then(|end| Some((end, self.slot(&after[..end])?))) {
                Some((end, content)) => {
                    out.push_str(&content);
                    rest = &after[end + 2..];
                }
                None => {
                    // not one of ours, keep it literally
                    out.push_str("{{");
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn slot(&self, id: &str) -> Option<Cow<'_, str>> {
        if id == "kpi-zone" {
            return Some(encode_double_quoted_attribute(&self.zone));
        }
        Target::ALL
            .into_iter()
            .find(|t| t.id() == id)
            .map(|t| Cow::Borrowed(self.content(t)))
    }

    fn set(&mut self, target: Target, html: String) {
        self.contents.insert(target, html);
    }
}

impl KpiView for HtmlPage {
    fn resolve_targets(&mut self) -> bool {
        Target::ALL
            .iter()
            .all(|t| self.template.contains(&t.placeholder()))
    }

    fn set_status(&mut self, text: &str) {
        self.set(Target::Subtitle, encode_text(text).into_owned());
    }

    fn set_updated(&mut self, text: &str) {
        self.set(Target::Updated, encode_text(text).into_owned());
    }

    fn set_cards(&mut self, metrics: &[KpiMetric]) {
        self.set(Target::Cards, metrics.iter().map(card_html).collect());
    }

    fn set_city_rows(&mut self, rows: &[GroupRow]) {
        self.set(Target::CityTable, rows.iter().map(row_html).collect());
    }

    fn set_route_rows(&mut self, rows: &[GroupRow]) {
        self.set(Target::RouteTable, rows.iter().map(row_html).collect());
    }
}
