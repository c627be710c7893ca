//! Ingestor catalogue
//!
//! An ingestor bundles everything one source needs: the registries to build,
//! the enrichment plan and the log tables. Ingestors are looked up by a name
//! of the form `<entity type>_<source org>`.

use crate::enrichment::EnrichmentPlan;
use crate::error::{PipelineError, Result};
use crate::schema::{
    artists, media_item_metadata_log, media_items, playlist_metadata_log, playlist_plays_log, playlist_positions_log,
    playlists, users, DimensionDefinition, LogTableDefinition, DIMENSION_SOURCE_ID,
};

/// Source organisation label for YouTube
pub const ORG_YOUTUBE: &str = "youtube";
/// Entity type label for playlists
pub const TYPE_PLAYLIST: &str = "playlist";

/// Everything needed to turn one source's raw rows into output tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestorDefinition {
    /// Catalogue name
    pub name: String,
    /// Raw attribute holding the observation timestamp
    pub timestamp_column: String,
    /// Registries to build, in order
    pub dimensions: Vec<DimensionDefinition>,
    /// How raw rows become enriched rows
    pub enrichment: EnrichmentPlan,
    /// Change logs to build
    pub logs: Vec<LogTableDefinition>,
}

/// Names of every registered ingestor
#[must_use]
pub fn valid_ingestors() -> Vec<String> {
    vec![format!("{TYPE_PLAYLIST}_{ORG_YOUTUBE}")]
}

/// Look an ingestor up by catalogue name
pub fn ingestor_by_name(name: &str) -> Result<IngestorDefinition> {
    if name == format!("{TYPE_PLAYLIST}_{ORG_YOUTUBE}") {
        Ok(playlist_youtube())
    } else {
        Err(PipelineError::UnknownIngestor {
            name: name.to_string(),
            valid: valid_ingestors(),
        })
    }
}

/// YouTube playlist crawl records
#[must_use]
pub fn playlist_youtube() -> IngestorDefinition {
    IngestorDefinition {
        name: format!("{TYPE_PLAYLIST}_{ORG_YOUTUBE}"),
        timestamp_column: "timestp".to_string(),
        dimensions: vec![
            DimensionDefinition::new(playlists::TABLE, "playlist_id", DIMENSION_SOURCE_ID).sourced_from(ORG_YOUTUBE),
            DimensionDefinition::new(users::TABLE, "channel_id", DIMENSION_SOURCE_ID).sourced_from(ORG_YOUTUBE),
            DimensionDefinition::new(media_items::TABLE, "video_id", DIMENSION_SOURCE_ID).sourced_from(ORG_YOUTUBE),
            // TODO: normalize artist name casing and spelling before assigning IDs
            DimensionDefinition::new(artists::TABLE, "artist_name", artists::NAME),
        ],
        enrichment: EnrichmentPlan::new()
            .inner_join(playlists::TABLE, "playlist_id", "playlist_id")
            .left_join(users::TABLE, "channel_id", "user_id")
            .inner_join(media_items::TABLE, "video_id", "media_item_id")
            .left_join(artists::TABLE, "artist_name", "artist_id")
            .project("playlist_name", "playlist_name")
            .project("artwork_url", "cover_url")
            .project("views", "plays")
            .project("num_videos", "num_media_items")
            .project("title", "primary_title")
            .project("image_url", "media_cover_url")
            .project("track_title", "secondary_title")
            .project("position", "position"),
        logs: vec![
            LogTableDefinition::new(
                playlist_metadata_log::TABLE,
                &["playlist_id"],
                &["playlist_name", "cover_url", "user_id", "num_media_items"],
            )
            .with_storage_alias("playlist_name", "name"),
            LogTableDefinition::new(playlist_plays_log::TABLE, &["playlist_id"], &["plays"]),
            LogTableDefinition::new(playlist_positions_log::TABLE, &["playlist_id", "media_item_id"], &["position"]),
            LogTableDefinition::new(
                media_item_metadata_log::TABLE,
                &["media_item_id"],
                &["primary_title", "secondary_title", "artist_id", "media_cover_url"],
            )
            .with_storage_alias("media_cover_url", "cover_url"),
        ],
    }
}
