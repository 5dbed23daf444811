use serde::Deserialize;
use shared::NutritionFacts;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const BUILTIN_TABLE: &str = include_str!("../../../config/nutrition.yaml");

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("Failed to read nutrition table: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse nutrition table: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid nutrition entry '{label}': {reason}")]
    InvalidEntry { label: String, reason: String },
    #[error("Duplicate nutrition entry for '{0}'")]
    Duplicate(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("No nutrition data for '{0}'")]
pub struct UnknownCategory(pub String);

#[derive(Debug, Deserialize)]
struct TableFile {
    version: u32,
    #[serde(default = "default_basis")]
    basis_grams: f64,
    foods: BTreeMap<String, RawRecord>,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    calories: Option<f64>,
    protein: f64,
    fat: f64,
    carbohydrates: f64,
    serving: Option<f64>,
}

fn default_basis() -> f64 {
    100.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct NutritionRecord {
    pub calories_kcal: f64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub carbohydrate_g: f64,
    pub serving_grams: Option<f64>,
}

impl NutritionRecord {
    fn from_raw(label: &str, raw: RawRecord, basis: f64) -> Result<Self, TableError> {
        let invalid = |reason: &str| TableError::InvalidEntry {
            label: label.to_string(),
            reason: reason.to_string(),
        };

        for value in [raw.protein, raw.fat, raw.carbohydrates] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid("macros must be finite and non-negative"));
            }
        }
        if raw.protein + raw.fat + raw.carbohydrates > basis {
            return Err(invalid("macros exceed the reference mass"));
        }

        let calories_kcal = match raw.calories {
            Some(c) if c.is_finite() && c >= 0.0 => c,
            Some(_) => return Err(invalid("calories must be finite and non-negative")),
            None => macro_calories(raw.protein, raw.fat, raw.carbohydrates),
        };

        if let Some(serving) = raw.serving {
            if !serving.is_finite() || serving <= 0.0 {
                return Err(invalid("serving must be positive"));
            }
        }

        Ok(Self {
            calories_kcal,
            protein_g: raw.protein,
            fat_g: raw.fat,
            carbohydrate_g: raw.carbohydrates,
            serving_grams: raw.serving,
        })
    }
}

pub fn macro_calories(protein: f64, fat: f64, carbohydrate: f64) -> f64 {
    round2(protein * 4.0 + carbohydrate * 4.0 + fat * 9.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Lowercase, trimmed, with `_` and `-` read as spaces.
pub fn normalize_key(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// "french_fries" -> "French Fries"
pub fn display_name(label: &str) -> String {
    normalize_key(label)
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[derive(Debug, Clone)]
pub struct NutritionTable {
    version: u32,
    basis_grams: f64,
    records: HashMap<String, NutritionRecord>,
}

impl NutritionTable {
    pub fn builtin() -> Result<Self, TableError> {
        Self::from_yaml(BUILTIN_TABLE)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, TableError> {
        let file: TableFile = serde_yaml::from_str(contents)?;
        if !file.basis_grams.is_finite() || file.basis_grams <= 0.0 {
            return Err(TableError::InvalidEntry {
                label: "basis_grams".into(),
                reason: "must be positive".into(),
            });
        }

        let mut records = HashMap::with_capacity(file.foods.len());
        for (label, raw) in file.foods {
            let key = normalize_key(&label);
            let record = NutritionRecord::from_raw(&label, raw, file.basis_grams)?;
            if records.insert(key, record).is_some() {
                return Err(TableError::Duplicate(label));
            }
        }

        Ok(Self {
            version: file.version,
            basis_grams: file.basis_grams,
            records,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn basis_grams(&self) -> f64 {
        self.basis_grams
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn lookup(&self, label: &str) -> Result<&NutritionRecord, UnknownCategory> {
        self.records
            .get(&normalize_key(label))
            .ok_or_else(|| UnknownCategory(label.to_string()))
    }

    /// Scales the record for `label` to `quantity_grams`.
    pub fn facts_for(&self, label: &str, quantity_grams: f64) -> Result<NutritionFacts, UnknownCategory> {
        let record = self.lookup(label)?;
        let factor = quantity_grams / self.basis_grams;
        Ok(NutritionFacts {
            quantity_grams,
            calories_kcal: round2(record.calories_kcal * factor),
            protein_g: round2(record.protein_g * factor),
            fat_g: round2(record.fat_g * factor),
            carbohydrate_g: round2(record.carbohydrate_g * factor),
            serving_grams: record.serving_grams,
        })
    }

    pub fn missing_labels<'a>(&self, labels: &'a [String]) -> Vec<&'a str> {
        labels
            .iter()
            .filter(|label| self.lookup(label).is_err())
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"
version: 2
basis_grams: 100
foods:
  apple: { calories: 52, protein: 0.3, fat: 0.2, carbohydrates: 13.8, serving: 182 }
  grilled_salmon: { protein: 20.4, fat: 13.4, carbohydrates: 0 }
"#;

    #[test]
    fn builtin_table_parses() {
        let table = NutritionTable::builtin().unwrap();
        assert!(table.len() > 10);
        assert_eq!(table.lookup("apple").unwrap().calories_kcal, 52.0);
    }

    #[test]
    fn builtin_table_covers_shipped_labels() {
        let descriptor = crate::inference::descriptor::ModelDescriptor::from_yaml(include_str!(
            "../../../config/model.yaml"
        ))
        .unwrap();
        let table = NutritionTable::builtin().unwrap();
        assert!(table.missing_labels(&descriptor.labels).is_empty());
    }

    #[test]
    fn lookup_normalizes_labels() {
        let table = NutritionTable::from_yaml(TABLE).unwrap();
        assert!(table.lookup("Grilled Salmon").is_ok());
        assert!(table.lookup(" grilled-salmon ").is_ok());
        assert_eq!(
            table.lookup("pizza").unwrap_err(),
            UnknownCategory("pizza".into())
        );
    }

    #[test]
    fn missing_calories_are_derived_from_macros() {
        let table = NutritionTable::from_yaml(TABLE).unwrap();
        let salmon = table.lookup("grilled_salmon").unwrap();
        assert_eq!(salmon.calories_kcal, 202.2);
    }

    #[test]
    fn facts_scale_with_quantity() {
        let table = NutritionTable::from_yaml(TABLE).unwrap();
        let facts = table.facts_for("apple", 250.0).unwrap();
        assert_eq!(facts.calories_kcal, 130.0);
        assert_eq!(facts.carbohydrate_g, 34.5);
        assert_eq!(facts.serving_grams, Some(182.0));
    }

    #[test]
    fn rejects_negative_values() {
        let yaml = TABLE.replace("protein: 0.3", "protein: -1");
        assert!(matches!(
            NutritionTable::from_yaml(&yaml),
            Err(TableError::InvalidEntry { .. })
        ));
    }

    #[test]
    fn rejects_keys_that_collide_after_normalization() {
        let yaml = format!(
            "{}  Apple: {{ calories: 1, protein: 0, fat: 0, carbohydrates: 0 }}\n",
            TABLE
        );
        assert!(matches!(
            NutritionTable::from_yaml(&yaml),
            Err(TableError::Duplicate(_))
        ));
    }

    #[test]
    fn display_name_is_title_case() {
        assert_eq!(display_name("french_fries"), "French Fries");
        assert_eq!(display_name("apple"), "Apple");
    }
}
