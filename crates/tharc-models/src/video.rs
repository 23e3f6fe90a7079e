//! Video and part records.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// A segment ("part") of a multi-part video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoPart {
    /// Part id, unique within a video
    pub cid: i64,
    /// 1-based ordinal within the video
    pub page: i64,
    /// Part label
    pub part: String,
    /// Duration in seconds
    pub duration: i64,
    /// Creation time (unix seconds)
    pub ctime: i64,
}

/// One item of an uploader's catalog, as listed by the space search or a
/// season enumeration and later enriched with parts and tags.
///
/// The wire exposes the publication timestamp as `created` on listing pages
/// and as `pubdate` inside season archives; both land in [`Video::created`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    /// Numeric id (av), primary identity
    pub aid: i64,
    /// Share id (bv)
    pub bvid: String,
    /// Uploader id
    pub mid: i64,
    /// Title
    pub title: String,
    /// Description, absent on some listings
    #[serde(default)]
    pub description: Option<String>,
    /// Cover image URI
    pub pic: String,
    /// Publication time (unix seconds)
    #[serde(alias = "pubdate")]
    pub created: i64,
    /// Season the video belongs to, if any. The wire uses `0` for "none".
    #[serde(default, deserialize_with = "season_id_or_none")]
    pub season_id: Option<i64>,
    /// Tag names in server order, not part of the listing payload
    #[serde(default)]
    pub tags: Vec<String>,
    /// Parts in server order, not part of the listing payload
    #[serde(default)]
    pub parts: Vec<VideoPart>,
    /// Classification status
    #[serde(default)]
    pub status: TouhouStatus,
}

fn season_id_or_none<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = Option::<i64>::deserialize(deserializer)?;
    Ok(id.filter(|id| *id != 0))
}

/// Whether a video belongs to the Touhou corpus.
///
/// `Auto*` values come from the tag classifier; `Confirmed*` values are set
/// by hand outside the crawler and are never overwritten by a re-ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TouhouStatus {
    /// Never classified
    #[default]
    Unchecked,
    /// Tag keyword matched
    AutoMatch,
    /// No tag keyword matched
    AutoNoMatch,
    /// Manually confirmed as Touhou
    ConfirmedMatch,
    /// Manually confirmed as not Touhou
    ConfirmedNoMatch,
}

impl TouhouStatus {
    /// Integer code as stored in the `videos.touhou_status` column.
    pub fn code(self) -> i64 {
        match self {
            TouhouStatus::Unchecked => 0,
            TouhouStatus::AutoMatch => 1,
            TouhouStatus::AutoNoMatch => 2,
            TouhouStatus::ConfirmedMatch => 3,
            TouhouStatus::ConfirmedNoMatch => 4,
        }
    }

    /// Inverse of [`TouhouStatus::code`].
    pub fn from_code(code: i64) -> Result<Self, StatusCodeError> {
        match code {
            0 => Ok(TouhouStatus::Unchecked),
            1 => Ok(TouhouStatus::AutoMatch),
            2 => Ok(TouhouStatus::AutoNoMatch),
            3 => Ok(TouhouStatus::ConfirmedMatch),
            4 => Ok(TouhouStatus::ConfirmedNoMatch),
            other => Err(StatusCodeError(other)),
        }
    }

    /// Whether this status was set by hand and must survive re-ingestion.
    pub fn is_confirmed(self) -> bool {
        matches!(
            self,
            TouhouStatus::ConfirmedMatch | TouhouStatus::ConfirmedNoMatch
        )
    }
}

#[derive(Debug, Error)]
#[error("unknown touhou status code: {0}")]
pub struct StatusCodeError(pub i64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_entry_parses() {
        let json = serde_json::json!({
            "aid": 170001,
            "bvid": "BV17x411w7KC",
            "mid": 66508,
            "title": "【東方】Bad Apple!!",
            "description": "影絵",
            "pic": "http://i0.hdslb.com/bfs/archive/xx.jpg",
            "created": 1287061409,
            "season_id": 0,
            "play": 1234,
            "length": "03:39"
        });
        let video: Video = serde_json::from_value(json).unwrap();
        assert_eq!(video.aid, 170001);
        assert_eq!(video.created, 1287061409);
        assert_eq!(video.season_id, None);
        assert!(video.tags.is_empty());
        assert_eq!(video.status, TouhouStatus::Unchecked);
    }

    #[test]
    fn season_archive_entry_uses_pubdate() {
        let json = serde_json::json!({
            "aid": 99,
            "bvid": "BV1xx411c7XX",
            "mid": 42,
            "title": "t",
            "pic": "p",
            "pubdate": 1600000000,
            "season_id": 77
        });
        let video: Video = serde_json::from_value(json).unwrap();
        assert_eq!(video.created, 1600000000);
        assert_eq!(video.season_id, Some(77));
        assert_eq!(video.description, None);
    }

    #[test]
    fn status_codes_round_trip() {
        for code in 0..=4 {
            assert_eq!(TouhouStatus::from_code(code).unwrap().code(), code);
        }
        assert!(TouhouStatus::from_code(5).is_err());
        assert!(TouhouStatus::ConfirmedMatch.is_confirmed());
        assert!(TouhouStatus::ConfirmedNoMatch.is_confirmed());
        assert!(!TouhouStatus::AutoMatch.is_confirmed());
    }
}
