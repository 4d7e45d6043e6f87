use crate::models::Track;

/// Identifies the target label across the inconsistent ways albums are tagged
#[derive(Debug, Clone)]
pub struct LabelMatcher {
    label: String,
    variants: Vec<String>,
}

impl LabelMatcher {
    /// The label name, its lowercase and uppercase forms, then any configured extras
    pub fn new(label: &str, extra_variants: &[String]) -> Self {
        let label = label.trim().to_string();
        let mut variants: Vec<String> = Vec::new();
        let candidates = [label.clone(), label.to_lowercase(), label.to_uppercase()]
            .into_iter()
            .chain(extra_variants.iter().map(|v| v.trim().to_string()));

        for candidate in candidates {
            if !candidate.is_empty() && !variants.contains(&candidate) {
                variants.push(candidate);
            }
        }

        Self { label, variants }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Spellings to use in `label:"..."` album searches
    pub fn query_variants(&self) -> &[String] {
        &self.variants
    }

    /// Whether an album's label field names the target label (case-insensitive containment)
    pub fn matches(&self, album_label: &str) -> bool {
        let candidate = album_label.trim().to_lowercase();
        if candidate.is_empty() {
            return false;
        }
        self.variants
            .iter()
            .any(|variant| candidate.contains(&variant.to_lowercase()))
    }

    pub fn is_member(&self, track: &Track) -> bool {
        track.label.as_deref().is_some_and(|label| self.matches(label))
    }
}
