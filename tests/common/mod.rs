//! Shared fixtures for the integration tests

#![allow(dead_code)]

use playlist_history::models::RawRow;
use playlist_history::source::records_to_rows;
use serde_json::{json, Value as JsonValue};

/// One crawl record for playlist `p1` and video `v1`
pub fn record(timestp: &str, playlist_name: &str, artwork_url: &str, channel_id: &str, num_videos: i64) -> JsonValue {
    json!({
        "playlist_id": "p1",
        "playlist_name": playlist_name,
        "artwork_url": artwork_url,
        "channel_id": channel_id,
        "views": 1,
        "num_videos": num_videos,
        "timestp": timestp,
        "video_id": "v1",
        "title": "t1",
        "artist_name": "an1",
        "image_url": "i1",
        "track_title": "tt1",
        "position": 1,
    })
}

/// Six observations over five days: the name changes on day 2, the cover on
/// day 3, the video count on day 4 and the channel twice on day 5.
pub fn scenario_records() -> JsonValue {
    JsonValue::Array(vec![
        record("2022-05-19T12:00:00.000000", "pn1", "au1", "c1", 1),
        record("2022-05-20T12:00:00.000000", "pn1_v2", "au1", "c1", 1),
        record("2022-05-21T12:00:00.000000", "pn1_v2", "au1_v2", "c1", 1),
        record("2022-05-22T12:00:00.000000", "pn1_v2", "au1_v2", "c1", 2),
        record("2022-05-23T12:00:00.000000", "pn1_v2", "au1_v2", "c1_v2", 2),
        record("2022-05-23T12:00:01.000000", "pn1_v2", "au1_v2", "c1_v3", 2),
    ])
}

/// The scenario as raw rows
pub fn scenario_rows() -> Vec<RawRow> {
    records_to_rows(&scenario_records(), "timestp").expect("scenario converts")
}
