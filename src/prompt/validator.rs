use super::activity::{ActivityTable, detect_intensity};
use super::duration::DurationParser;

/// Outcome of checking a prompt before any external call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks a prompt for an activity, a duration and an intensity.
/// With `strict` set, a missing activity or duration is an error instead of a warning.
pub fn validate_prompt(
    prompt: &str,
    activities: &ActivityTable,
    durations: &DurationParser,
    strict: bool,
) -> ValidationResult {
    let mut result = ValidationResult::default();

    if prompt.trim().is_empty() {
        result.errors.push("The prompt is empty".to_string());
        return result;
    }

    let has_activity = !activities.find_matching(prompt).is_empty();
    if !has_activity {
        let message =
            "Mention an activity (e.g. correr, estudiar, trabajar, relajarte) to tune the tempo".to_string();
        if strict {
            result.errors.push(message);
        } else {
            result.warnings.push(message);
        }
    }

    if durations.requested_minutes(prompt).is_none() {
        let message = "Mention a duration (e.g. 45 minutos, 1 hora, 2 horas)".to_string();
        if strict {
            result.errors.push(message);
        } else {
            result.warnings.push(message);
        }
    }

    if has_activity && detect_intensity(prompt).is_none() {
        result.warnings.push(
            "Add an intensity for better results (e.g. más chill, entrenamiento fuerte)".to_string(),
        );
    }

    result
}
