use serde::Deserialize;
use shared::{ActivityLevel, DailyNeedsResponse, Goal, Sex};

const FIBER_TARGET_G: i64 = 25;

#[derive(Debug, thiserror::Error)]
#[error("Invalid profile: {0}")]
pub struct ProfileError(String);

/// Body measurements and habits used to estimate daily intake.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub weight_kg: f64,
    pub height_cm: f64,
    pub age: f64,
    pub sex: Sex,
    pub activity: ActivityLevel,
    pub goal: Goal,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            weight_kg: 70.0,
            height_cm: 170.0,
            age: 30.0,
            sex: Sex::Male,
            activity: ActivityLevel::Moderate,
            goal: Goal::Maintain,
        }
    }
}

impl Profile {
    pub fn validate(&self) -> Result<(), ProfileError> {
        let ranges = [
            ("weight_kg", self.weight_kg, 1.0, 500.0),
            ("height_cm", self.height_cm, 30.0, 280.0),
            ("age", self.age, 1.0, 130.0),
        ];
        for (name, value, min, max) in ranges {
            if !value.is_finite() || value < min || value > max {
                return Err(ProfileError(format!("{} must be between {} and {}", name, min, max)));
            }
        }
        Ok(())
    }
}

fn activity_multiplier(level: ActivityLevel) -> f64 {
    match level {
        ActivityLevel::Sedentary => 1.2,
        ActivityLevel::Light => 1.375,
        ActivityLevel::Moderate => 1.55,
        ActivityLevel::Active => 1.725,
        ActivityLevel::VeryActive => 1.9,
    }
}

fn goal_factor(goal: Goal) -> f64 {
    match goal {
        Goal::Lose => 0.85,
        Goal::Maintain => 1.0,
        Goal::Gain => 1.15,
    }
}

/// Mifflin-St Jeor resting energy in kcal.
pub fn basal_metabolic_rate(profile: &Profile) -> f64 {
    let base = 10.0 * profile.weight_kg + 6.25 * profile.height_cm - 5.0 * profile.age;
    match profile.sex {
        Sex::Male => base + 5.0,
        Sex::Female => base - 161.0,
    }
}

pub fn daily_needs(profile: &Profile) -> Result<DailyNeedsResponse, ProfileError> {
    profile.validate()?;

    let tdee = basal_metabolic_rate(profile) * activity_multiplier(profile.activity);
    let calories = tdee * goal_factor(profile.goal);

    // 30% protein, 25% fat, 45% carbohydrate; sugar capped at 10%.
    Ok(DailyNeedsResponse {
        daily_calories: calories.round() as i64,
        protein: (calories * 0.30 / 4.0).round() as i64,
        fat: (calories * 0.25 / 9.0).round() as i64,
        carbs: (calories * 0.45 / 4.0).round() as i64,
        sugar_limit: (calories * 0.10 / 4.0).round() as i64,
        fiber_target: FIBER_TARGET_G,
    })
}
