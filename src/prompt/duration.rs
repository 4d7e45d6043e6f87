use regex::Regex;
use std::sync::LazyLock;

/// Average track length assumed when turning minutes into a track count
pub const AVERAGE_TRACK_MINUTES: f64 = 3.5;
pub const DEFAULT_MINUTES: u32 = 20;
pub const MIN_TRACKS: usize = 10;
pub const MAX_TRACKS: usize = 100;

const HOUR_UNITS: &str = r"(?:horas?|hours?|hrs?|h)";
const MINUTE_UNITS: &str = r"(?:minutos?|minutes?|mins?)";
const APPROX_QUALIFIER: &str = r"(?:aprox(?:imadamente|\.)?|approx(?:imately|\.)?|alrededor\s+de|cerca\s+de|about|around|unos)";

/// Requested listening time and the track count derived from it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationRequest {
    /// Minutes found in the prompt, if any
    pub requested_minutes: Option<u32>,
    /// Minutes actually used (requested or the default)
    pub effective_minutes: u32,
    pub track_count: usize,
}

fn compile(pattern: String) -> Regex {
    Regex::new(&pattern).expect("duration patterns are valid")
}

static COMBINED: LazyLock<Regex> = LazyLock::new(|| {
    compile(format!(
        r"(?i)(\d+)\s*{HOUR_UNITS}\s*(?:y|and|,)?\s*(\d+)\s*{MINUTE_UNITS}"
    ))
});
static HOURS: LazyLock<Regex> = LazyLock::new(|| {
    compile(format!(
        r"(?i)(\d+(?:[.,]\d+)?|\b(?:una|an|one))\s*{HOUR_UNITS}\b"
    ))
});
static HALF_HOUR: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(?:media\s+hora|half\s+an?\s+hour)\b".to_string()));
static APPROX_MINUTES: LazyLock<Regex> =
    LazyLock::new(|| compile(format!(r"(?i){APPROX_QUALIFIER}\s*(\d+)\s*{MINUTE_UNITS}")));
static MINUTES: LazyLock<Regex> =
    LazyLock::new(|| compile(format!(r"(?i)(\d+)\s*{MINUTE_UNITS}\b")));
static QUALIFIER_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| compile(format!(r"(?i){APPROX_QUALIFIER}\s*$")));

/// Extracts a listening duration from free text
#[derive(Debug, Clone)]
pub struct DurationParser {
    minutes_per_track: f64,
    default_minutes: u32,
    min_tracks: usize,
    max_tracks: usize,
}

impl Default for DurationParser {
    fn default() -> Self {
        Self::new(AVERAGE_TRACK_MINUTES, DEFAULT_MINUTES, MIN_TRACKS, MAX_TRACKS)
    }
}

impl DurationParser {
    pub fn new(
        minutes_per_track: f64,
        default_minutes: u32,
        min_tracks: usize,
        max_tracks: usize,
    ) -> Self {
        Self {
            minutes_per_track: if minutes_per_track > 0.0 {
                minutes_per_track
            } else {
                AVERAGE_TRACK_MINUTES
            },
            default_minutes,
            min_tracks,
            max_tracks: max_tracks.max(min_tracks),
        }
    }

    /// Minutes requested in the prompt, checking the most specific phrasing first
    pub fn requested_minutes(&self, prompt: &str) -> Option<u32> {
        if let Some(caps) = COMBINED.captures(prompt) {
            // Counts too large for u32 saturate
            let hours: u32 = caps[1].parse().unwrap_or(u32::MAX);
            let minutes: u32 = caps[2].parse().unwrap_or(u32::MAX);
            return Some(hours.saturating_mul(60).saturating_add(minutes));
        }

        if let Some(caps) = HOURS.captures(prompt) {
            let hours = parse_hours(&caps[1])?;
            return Some((hours * 60.0).round() as u32);
        }

        if HALF_HOUR.is_match(prompt) {
            return Some(30);
        }

        if let Some(caps) = APPROX_MINUTES.captures(prompt) {
            return caps[1].parse().ok();
        }

        // A bare minute count only counts when no qualifier precedes it
        for caps in MINUTES.captures_iter(prompt) {
            let whole = caps.get(0)?;
            if QUALIFIER_SUFFIX.is_match(&prompt[..whole.start()]) {
                continue;
            }
            if let Ok(minutes) = caps[1].parse() {
                return Some(minutes);
            }
        }

        None
    }

    /// `ceil(minutes / minutes_per_track)` clamped to the configured bounds
    pub fn track_count_for(&self, minutes: u32) -> usize {
        let raw = (minutes as f64 / self.minutes_per_track).ceil() as usize;
        raw.clamp(self.min_tracks, self.max_tracks)
    }

    /// Parse the prompt, falling back to the default duration when none is given
    pub fn parse(&self, prompt: &str) -> DurationRequest {
        let requested_minutes = self.requested_minutes(prompt);
        let effective_minutes = requested_minutes.unwrap_or(self.default_minutes);
        DurationRequest {
            requested_minutes,
            effective_minutes,
            track_count: self.track_count_for(effective_minutes),
        }
    }
}

fn parse_hours(value: &str) -> Option<f64> {
    match value.to_lowercase().as_str() {
        "una" | "an" | "one" => Some(1.0),
        number => number.replace(',', ".").parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_minutes() {
        let parser = DurationParser::default();
        assert_eq!(parser.requested_minutes("playlist para correr 30 minutos"), Some(30));
        assert_eq!(parser.requested_minutes("45 min de estudio"), Some(45));
        assert_eq!(parser.requested_minutes("music for 25 minutes"), Some(25));
    }

    #[test]
    fn approximate_minutes_are_not_double_counted() {
        let parser = DurationParser::default();
        assert_eq!(parser.requested_minutes("aprox 45 minutos para leer"), Some(45));
        assert_eq!(parser.requested_minutes("aproximadamente 50 minutos"), Some(50));
        for n in [5, 12, 45, 90, 240] {
            assert_eq!(parser.requested_minutes(&format!("{n} minutos")), Some(n));
            assert_eq!(parser.requested_minutes(&format!("aprox {n} minutos")), Some(n));
        }
    }

    #[test]
    fn hours_and_minutes_combine() {
        let parser = DurationParser::default();
        assert_eq!(parser.requested_minutes("1 hora y 20 minutos"), Some(80));
        assert_eq!(parser.requested_minutes("2 horas, 5 min entrenando"), Some(125));
        assert_eq!(parser.requested_minutes("1h 30min"), Some(90));
        for (h, m) in [(1, 1), (2, 45), (3, 10)] {
            assert_eq!(
                parser.requested_minutes(&format!("{h} horas y {m} minutos")),
                Some(h * 60 + m)
            );
        }
    }

    #[test]
    fn huge_hour_counts_saturate_and_clamp() {
        let parser = DurationParser::default();
        assert_eq!(
            parser.requested_minutes("80000000 horas y 5 minutos"),
            Some(u32::MAX)
        );
        assert_eq!(
            parser.requested_minutes("9999999999 horas y 5 minutos"),
            Some(u32::MAX)
        );
        let request = parser.parse("5000000000 horas");
        assert_eq!(request.effective_minutes, u32::MAX);
        assert_eq!(request.track_count, MAX_TRACKS);
    }

    #[test]
    fn bare_hours_and_word_forms() {
        let parser = DurationParser::default();
        assert_eq!(parser.requested_minutes("2 horas de trabajo"), Some(120));
        assert_eq!(parser.requested_minutes("1.5 horas"), Some(90));
        assert_eq!(parser.requested_minutes("una hora de yoga"), Some(60));
        assert_eq!(parser.requested_minutes("media hora caminando"), Some(30));
    }

    #[test]
    fn no_duration_phrase() {
        let parser = DurationParser::default();
        assert_eq!(parser.requested_minutes("algo para cocinar"), None);
        // A number without a unit is not a duration
        assert_eq!(parser.requested_minutes("top 40 hits"), None);
    }

    #[test]
    fn default_duration_when_absent() {
        let parser = DurationParser::default();
        let request = parser.parse("musica para la cena");
        assert_eq!(request.requested_minutes, None);
        assert_eq!(request.effective_minutes, DEFAULT_MINUTES);
        assert_eq!(request.track_count, MIN_TRACKS);
    }

    #[test]
    fn track_count_is_clamped_and_monotonic() {
        let parser = DurationParser::default();
        assert_eq!(parser.track_count_for(0), 10);
        assert_eq!(parser.track_count_for(30), 10);
        assert_eq!(parser.track_count_for(60), 18);
        assert_eq!(parser.track_count_for(120), 35);
        assert_eq!(parser.track_count_for(1000), 100);

        let mut previous = 0;
        for minutes in 0..600 {
            let count = parser.track_count_for(minutes);
            assert!((MIN_TRACKS..=MAX_TRACKS).contains(&count));
            assert!(count >= previous);
            previous = count;
        }
    }
}
