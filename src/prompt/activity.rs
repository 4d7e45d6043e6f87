use crate::models::BpmRange;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One row of the activity → tempo reference table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "actividad")]
    pub name: String,
    #[serde(rename = "intensidad")]
    pub intensity: String,
    pub bpm_min: u32,
    pub bpm_max: u32,
}

/// Activity identified in a prompt, with the tempo window it implies
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityMatch {
    pub activity: String,
    pub intensity: String,
    pub bpm: BpmRange,
}

/// An intensity phrase and the table intensity labels it selects
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensityPhrase {
    pub phrase: &'static str,
    pub labels: &'static [&'static str],
}

const LOW: &[&str] = &["Baja", "Muy baja"];
const SOFT: &[&str] = &["Baja", "Baja-Moderada"];
const MODERATE: &[&str] = &["Moderada"];
const HIGH: &[&str] = &["Alta", "Moderada-Alta"];
const HARD: &[&str] = &["Alta", "Muy alta"];
const VERY_HIGH: &[&str] = &["Muy alta"];

/// Ordered longest first so "muy alta" wins over "alta" and "entrenamiento fuerte" over "fuerte"
pub const INTENSITY_PHRASES: &[IntensityPhrase] = &[
    IntensityPhrase { phrase: "entrenamiento fuerte", labels: HARD },
    IntensityPhrase { phrase: "más chill", labels: LOW },
    IntensityPhrase { phrase: "mas chill", labels: LOW },
    IntensityPhrase { phrase: "muy alta", labels: VERY_HIGH },
    IntensityPhrase { phrase: "relajada", labels: LOW },
    IntensityPhrase { phrase: "moderada", labels: MODERATE },
    IntensityPhrase { phrase: "intensa", labels: HARD },
    IntensityPhrase { phrase: "fuerte", labels: HARD },
    IntensityPhrase { phrase: "chill", labels: LOW },
    IntensityPhrase { phrase: "suave", labels: SOFT },
    IntensityPhrase { phrase: "media", labels: MODERATE },
    IntensityPhrase { phrase: "alta", labels: HIGH },
];

const BUILTIN: &[(&str, &str, u32, u32)] = &[
    ("correr", "Moderada", 140, 160),
    ("correr", "Alta", 160, 180),
    ("correr", "Muy alta", 170, 190),
    ("trotar", "Moderada", 130, 150),
    ("caminar", "Baja", 90, 110),
    ("caminar", "Moderada", 110, 125),
    ("ciclismo", "Moderada", 120, 140),
    ("ciclismo", "Alta", 140, 165),
    ("bicicleta", "Moderada", 120, 140),
    ("spinning", "Alta", 140, 170),
    ("gimnasio", "Moderada-Alta", 125, 145),
    ("gimnasio", "Alta", 140, 160),
    ("pesas", "Moderada-Alta", 110, 135),
    ("entrenar", "Moderada", 120, 140),
    ("entrenar", "Alta", 140, 160),
    ("entrenar", "Muy alta", 160, 180),
    ("crossfit", "Muy alta", 150, 175),
    ("hiit", "Muy alta", 150, 180),
    ("cardio", "Alta", 135, 160),
    ("bailar", "Moderada-Alta", 110, 130),
    ("bailar", "Alta", 125, 140),
    ("fiesta", "Alta", 120, 135),
    ("yoga", "Baja", 60, 90),
    ("yoga", "Baja-Moderada", 80, 100),
    ("estiramiento", "Baja", 70, 95),
    ("meditar", "Muy baja", 50, 70),
    ("meditación", "Muy baja", 50, 70),
    ("dormir", "Muy baja", 40, 65),
    ("relajarse", "Baja", 60, 85),
    ("relajarme", "Baja", 60, 85),
    ("relajarte", "Baja", 60, 85),
    ("leer", "Baja", 60, 90),
    ("estudiar", "Baja", 60, 90),
    ("estudiar", "Baja-Moderada", 70, 100),
    ("concentrarse", "Baja-Moderada", 70, 100),
    ("trabajar", "Baja-Moderada", 80, 110),
    ("trabajar", "Moderada", 95, 120),
    ("programar", "Baja-Moderada", 80, 110),
    ("cocinar", "Moderada", 95, 120),
    ("limpiar", "Moderada-Alta", 110, 130),
    ("manejar", "Moderada", 90, 120),
    ("conducir", "Moderada", 90, 120),
    ("viaje", "Moderada", 90, 120),
    ("cena", "Baja", 70, 100),
    ("despertar", "Baja-Moderada", 80, 110),
];

/// Static activity reference data
#[derive(Debug, Clone)]
pub struct ActivityTable {
    activities: Vec<Activity>,
}

impl Default for ActivityTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ActivityTable {
    pub fn builtin() -> Self {
        Self {
            activities: BUILTIN
                .iter()
                .map(|(name, intensity, bpm_min, bpm_max)| Activity {
                    name: name.to_string(),
                    intensity: intensity.to_string(),
                    bpm_min: *bpm_min,
                    bpm_max: *bpm_max,
                })
                .collect(),
        }
    }

    /// Load a replacement table from a JSON array of `{actividad, intensidad, bpm_min, bpm_max}`
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading activity table {path}"))?;
        let activities: Vec<Activity> = serde_json::from_str(&content)
            .with_context(|| format!("parsing activity table {path}"))?;
        Ok(Self { activities })
    }

    /// Activities whose name contains the text, or is contained in it, in table order
    pub fn find_matching(&self, text: &str) -> Vec<&Activity> {
        let normalized = text.trim().to_lowercase();
        if normalized.is_empty() {
            return Vec::new();
        }

        self.activities
            .iter()
            .filter(|activity| {
                let name = activity.name.trim().to_lowercase();
                !name.is_empty() && (name.contains(&normalized) || normalized.contains(&name))
            })
            .collect()
    }

    /// Match a prompt to an activity, narrowed by an intensity phrase when one is present.
    /// `explicit_intensity` takes precedence over any phrase found in the prompt.
    pub fn match_prompt(&self, prompt: &str, explicit_intensity: Option<&str>) -> Option<ActivityMatch> {
        let matches = self.find_matching(prompt);
        let first = *matches.first()?;

        let intensity = explicit_intensity
            .and_then(detect_intensity)
            .or_else(|| detect_intensity(prompt));

        let selected = intensity
            .and_then(|phrase| {
                matches
                    .iter()
                    .copied()
                    .find(|activity| phrase.labels.contains(&activity.intensity.as_str()))
            })
            .unwrap_or(first);

        debug!(
            activity = %selected.name,
            intensity = %selected.intensity,
            phrase = intensity.map(|p| p.phrase),
            "Matched activity"
        );

        Some(ActivityMatch {
            activity: selected.name.clone(),
            intensity: selected.intensity.clone(),
            bpm: BpmRange::new(selected.bpm_min as f64, selected.bpm_max as f64),
        })
    }
}

/// First intensity phrase appearing as a whole phrase in the text, most specific first
pub fn detect_intensity(text: &str) -> Option<&'static IntensityPhrase> {
    // "media hora" is a duration, not an intensity
    let normalized = text.to_lowercase().replace("media hora", " ");
    INTENSITY_PHRASES
        .iter()
        .find(|candidate| contains_phrase(&normalized, candidate.phrase))
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack.match_indices(phrase).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
