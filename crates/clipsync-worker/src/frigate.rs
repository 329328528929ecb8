//! Frigate HTTP API helpers

/// URL of the MP4 clip Frigate serves for an event
pub fn generate_video_url(frigate_url: &str, event_id: &str) -> String {
    format!(
        "{}/api/events/{}/clip.mp4",
        frigate_url.trim_end_matches('/'),
        event_id
    )
}
