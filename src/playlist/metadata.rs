use crate::models::Track;
use std::collections::HashSet;

/// Metadata about the playlist composition
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistMetadata {
    pub total_duration_ms: u64,
    pub total_tracks: usize,
    pub artist_count: usize,
    /// Lowest and highest known tempo; `None` when no track carries one
    pub tempo_range: Option<(f64, f64)>,
    pub average_tempo: Option<f64>,
}

impl PlaylistMetadata {
    pub fn from_tracks(tracks: &[Track]) -> Self {
        let artists: HashSet<String> = tracks.iter().map(|t| t.artist.to_lowercase()).collect();
        let tempos: Vec<f64> = tracks.iter().filter_map(|t| t.tempo).collect();

        let tempo_range = tempos.iter().fold(None, |range: Option<(f64, f64)>, &tempo| match range {
            Some((min, max)) => Some((min.min(tempo), max.max(tempo))),
            None => Some((tempo, tempo)),
        });
        let average_tempo = (!tempos.is_empty()).then(|| tempos.iter().sum::<f64>() / tempos.len() as f64);

        Self {
            total_duration_ms: tracks.iter().map(|t| t.duration_ms).sum(),
            total_tracks: tracks.len(),
            artist_count: artists.len(),
            tempo_range,
            average_tempo,
        }
    }

    /// Duration as `1h 05m` or `23m 10s`
    pub fn formatted_duration(&self) -> String {
        let total_seconds = self.total_duration_ms / 1000;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;
        if hours > 0 {
            format!("{hours}h {minutes:02}m")
        } else {
            format!("{minutes}m {seconds:02}s")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_IMAGE;
    use approx::assert_relative_eq;

    fn track(id: &str, artist: &str, duration_ms: u64, tempo: Option<f64>) -> Track {
        Track {
            id: id.to_string(),
            name: id.to_string(),
            artist: artist.to_string(),
            artist_id: None,
            album: "Album".to_string(),
            album_id: None,
            image: DEFAULT_IMAGE.to_string(),
            duration_ms,
            preview_url: None,
            uri: format!("spotify:track:{id}"),
            label: None,
            tempo,
        }
    }

    #[test]
    fn summarizes_duration_artists_and_tempo() {
        let tracks = vec![
            track("1", "Bad Bunny", 200_000, Some(150.5)),
            track("2", "bad bunny", 190_000, None),
            track("3", "Karol G", 215_000, Some(142.0)),
        ];
        let metadata = PlaylistMetadata::from_tracks(&tracks);

        assert_eq!(metadata.total_tracks, 3);
        assert_eq!(metadata.artist_count, 2);
        assert_eq!(metadata.total_duration_ms, 605_000);
        assert_eq!(metadata.formatted_duration(), "10m 05s");
        let (min, max) = metadata.tempo_range.unwrap();
        assert_relative_eq!(min, 142.0);
        assert_relative_eq!(max, 150.5);
        assert_relative_eq!(metadata.average_tempo.unwrap(), 146.25);
    }

    #[test]
    fn long_playlists_show_hours() {
        let tracks = vec![track("1", "A", 3_900_000, None)];
        let metadata = PlaylistMetadata::from_tracks(&tracks);
        assert_eq!(metadata.formatted_duration(), "1h 05m");
        assert_eq!(metadata.tempo_range, None);
        assert_eq!(metadata.average_tempo, None);
    }
}
