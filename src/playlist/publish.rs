use crate::client::{MAX_PLAYLIST_ADD, StreamingApi};
use crate::error::PipelineError;
use crate::models::Track;
use tracing::{info, warn};

const OPEN_PLAYLIST_URL: &str = "https://open.spotify.com/playlist";

/// A playlist created on the streaming service
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedPlaylist {
    pub id: String,
    pub url: String,
    pub added: usize,
    pub failed_batches: usize,
}

/// Create the playlist for `user_id` and add the tracks in service-sized batches.
/// A failed batch is logged and the rest are still sent.
pub fn publish_playlist(
    api: &dyn StreamingApi,
    user_id: &str,
    name: &str,
    description: &str,
    tracks: &[Track],
    public: bool,
) -> Result<PublishedPlaylist, PipelineError> {
    let created = api.create_playlist(user_id, name, description, public)?;
    info!(playlist_id = %created.id, %name, "Created playlist");

    let uris: Vec<String> = tracks
        .iter()
        .filter(|t| !t.uri.is_empty())
        .map(|t| t.uri.clone())
        .collect();

    let mut added = 0;
    let mut failed_batches = 0;
    for batch in uris.chunks(MAX_PLAYLIST_ADD) {
        match api.add_tracks(&created.id, batch) {
            Ok(()) => added += batch.len(),
            Err(err) => {
                warn!(%err, batch = batch.len(), playlist_id = %created.id, "Failed to add tracks");
                failed_batches += 1;
            }
        }
    }

    let url = created
        .external_urls
        .and_then(|urls| urls.spotify)
        .unwrap_or_else(|| format!("{OPEN_PLAYLIST_URL}/{}", created.id));

    Ok(PublishedPlaylist {
        id: created.id,
        url,
        added,
        failed_batches,
    })
}
