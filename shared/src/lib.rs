use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Nutrition values scaled to the analysed quantity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NutritionFacts {
    pub quantity_grams: f64,
    pub calories_kcal: f64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub carbohydrate_g: f64,
    pub serving_grams: Option<f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AnalysisResponse {
    pub request_id: String,
    pub label: String,
    pub display_name: String,
    pub confidence: f32,
    /// Highest-scoring labels, best first.
    pub top_predictions: Vec<LabelScore>,
    pub image_sha256: String,
    /// `None` when the label has no entry in the nutrition table.
    pub nutrition: Option<NutritionFacts>,
    pub generated_at: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LabelScore {
    pub label: String,
    pub probability: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LabelsResponse {
    pub version: u32,
    pub labels: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

/// What to do when the predicted label has no nutrition entry.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UnknownCategoryPolicy {
    #[default]
    Placeholder,
    Reject,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Sex {
    #[default]
    Male,
    Female,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    #[default]
    Moderate,
    Active,
    VeryActive,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Goal {
    Lose,
    #[default]
    Maintain,
    Gain,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DailyNeedsResponse {
    pub daily_calories: i64,
    pub protein: i64,
    pub fat: i64,
    pub carbs: i64,
    pub sugar_limit: i64,
    pub fiber_target: i64,
}
