use minijinja::{context, Environment};
use serde::Serialize;
use shared::{NutritionFacts, UnknownCategoryPolicy};

use crate::inference::model::ClassificationResult;
use crate::nutrition::table::{display_name, NutritionTable, UnknownCategory};

#[derive(Debug, thiserror::Error)]
#[error("Failed to render {template}: {source}")]
pub struct RenderError {
    template: &'static str,
    source: minijinja::Error,
}

/// Everything the report page shows for one analysed image.
#[derive(Debug, Clone)]
pub struct Report {
    pub label: String,
    pub display_name: String,
    pub quantity_grams: f64,
    pub basis_grams: f64,
    pub facts: Option<NutritionFacts>,
}

impl Report {
    /// Looks the label up; a miss becomes a placeholder or an error per `policy`.
    pub fn build(
        result: &ClassificationResult,
        table: &NutritionTable,
        policy: UnknownCategoryPolicy,
        quantity_grams: f64,
    ) -> Result<Self, UnknownCategory> {
        let facts = match table.facts_for(&result.label, quantity_grams) {
            Ok(facts) => Some(facts),
            Err(missing) => match policy {
                UnknownCategoryPolicy::Reject => return Err(missing),
                UnknownCategoryPolicy::Placeholder => {
                    log::warn!("{}; rendering placeholder", missing);
                    None
                }
            },
        };

        Ok(Self {
            label: result.label.clone(),
            display_name: display_name(&result.label),
            quantity_grams,
            basis_grams: table.basis_grams(),
            facts,
        })
    }
}

#[derive(Serialize)]
struct FactsView {
    calories: String,
    protein: String,
    fat: String,
    carbohydrate: String,
    serving: Option<String>,
}

impl From<&NutritionFacts> for FactsView {
    fn from(facts: &NutritionFacts) -> Self {
        Self {
            calories: format_amount(facts.calories_kcal),
            protein: format_amount(facts.protein_g),
            fat: format_amount(facts.fat_g),
            carbohydrate: format_amount(facts.carbohydrate_g),
            serving: facts.serving_grams.map(format_amount),
        }
    }
}

/// Up to two decimals with trailing zeros dropped: 52.0 -> "52", 0.30 -> "0.3".
pub fn format_amount(value: f64) -> String {
    let fixed = format!("{:.2}", value);
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn format_bytes(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MiB", bytes / MIB)
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} bytes", bytes)
    }
}

pub struct ReportRenderer {
    env: Environment<'static>,
}

impl ReportRenderer {
    pub fn new() -> Result<Self, RenderError> {
        let mut env = Environment::new();
        let templates = [
            ("base.html", include_str!("../templates/base.html")),
            ("index.html", include_str!("../templates/index.html")),
            ("report.html", include_str!("../templates/report.html")),
            ("error.html", include_str!("../templates/error.html")),
        ];
        for (name, source) in templates {
            env.add_template(name, source)
                .map_err(|source| RenderError { template: name, source })?;
        }
        Ok(Self { env })
    }

    fn render(&self, template: &'static str, ctx: minijinja::Value) -> Result<String, RenderError> {
        self.env
            .get_template(template)
            .and_then(|t| t.render(ctx))
            .map_err(|source| RenderError { template, source })
    }

    pub fn render_index(&self, labels: &[String], max_upload_bytes: usize) -> Result<String, RenderError> {
        let names: Vec<String> = labels.iter().map(|l| display_name(l)).collect();
        self.render(
            "index.html",
            context! {
                labels => names,
                max_upload => format_bytes(max_upload_bytes),
            },
        )
    }

    pub fn render_report(
        &self,
        report: &Report,
        generated_at: &str,
        request_id: &str,
    ) -> Result<String, RenderError> {
        self.render(
            "report.html",
            context! {
                label => &report.label,
                display_name => &report.display_name,
                quantity => format_amount(report.quantity_grams),
                basis => format_amount(report.basis_grams),
                facts => report.facts.as_ref().map(FactsView::from),
                generated_at => generated_at,
                request_id => request_id,
            },
        )
    }

    pub fn render_error(&self, title: &str, message: &str) -> Result<String, RenderError> {
        self.render("error.html", context! { title => title, message => message })
    }
}
