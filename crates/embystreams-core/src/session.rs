//! Session normalization.
//!
//! Upstream session objects are loosely typed and frequently incomplete, so
//! they are held as raw JSON behind [`RawSession`], whose getters return
//! `None` for anything absent or of the wrong shape. [`SessionNormalizer`]
//! turns one into a [`DisplaySession`]; it never fails.
//!
//! Nothing here escapes strings. The renderer that turns a `DisplaySession`
//! into markup owns escaping for its output format.

use std::borrow::Cow;

use serde::Serialize;
use serde_json::Value;

use crate::error::UpstreamError;
use crate::format::{format_bitrate, format_ticks, round1};

const UNKNOWN: &str = "Unknown";
const ITEM_IMAGE_WIDTH: u32 = 150;
const USER_IMAGE_WIDTH: u32 = 50;

/// Borrowed view over an optional JSON value with lenient typed getters.
#[derive(Debug, Clone, Copy)]
pub struct Field<'a>(Option<&'a Value>);

impl<'a> Field<'a> {
    pub fn get(self, key: &str) -> Field<'a> {
        Field(self.0.and_then(|v| v.get(key)))
    }

    pub fn is_present(self) -> bool {
        !matches!(self.0, None | Some(Value::Null))
    }

    /// Non-empty string value.
    pub fn str(self) -> Option<&'a str> {
        self.0.and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// Integer value; accepts floats (truncated) and numeric strings.
    pub fn i64(self) -> Option<i64> {
        match self.0? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn f64(self) -> Option<f64> {
        match self.0? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn bool(self) -> Option<bool> {
        self.0.and_then(Value::as_bool)
    }

    pub fn array(self) -> &'a [Value] {
        self.0
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Non-empty strings in an array field.
    pub fn strings(self) -> Vec<String> {
        self.array()
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// One untrusted upstream session object.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSession(Value);

impl RawSession {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn root(&self) -> Field<'_> {
        Field(Some(&self.0))
    }

    pub fn field(&self, key: &str) -> Field<'_> {
        self.root().get(key)
    }

    pub fn now_playing(&self) -> Field<'_> {
        self.field("NowPlayingItem")
    }

    /// The session is playing something: `NowPlayingItem` is present and
    /// not an empty object.
    pub fn is_now_playing(&self) -> bool {
        match self.now_playing().0 {
            None | Some(Value::Null) => false,
            Some(Value::Object(m)) => !m.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}

impl From<Value> for RawSession {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Decode an upstream `/Sessions` body: a JSON array of objects.
pub fn parse_session_list(body: &[u8]) -> Result<Vec<RawSession>, UpstreamError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| UpstreamError::InvalidBody)?;
    let Value::Array(items) = value else {
        return Err(UpstreamError::InvalidBody);
    };
    items
        .into_iter()
        .map(|item| {
            if item.is_object() {
                Ok(RawSession(item))
            } else {
                Err(UpstreamError::InvalidBody)
            }
        })
        .collect()
}

/// How the media reaches the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlayMethod {
    DirectPlay,
    DirectStream,
    Transcode,
    Unknown,
}

impl PlayMethod {
    /// Map the upstream `PlayState.PlayMethod` string.
    pub fn from_upstream(s: &str) -> Self {
        match s {
            "DirectPlay" => PlayMethod::DirectPlay,
            "DirectStream" => PlayMethod::DirectStream,
            "Transcode" => PlayMethod::Transcode,
            _ => PlayMethod::Unknown,
        }
    }
}

/// Transcoding parameters, present only for [`PlayMethod::Transcode`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeDetails {
    pub video_codec: String,
    pub audio_codec: String,
    pub bitrate: u64,
    pub bitrate_text: String,
    pub width: u32,
    pub height: u32,
    pub completion: f64,
    pub hw_accel: String,
    pub reasons: Vec<String>,
}

impl TranscodeDetails {
    fn from_field(info: Field<'_>) -> Self {
        let bitrate = info.get("Bitrate").i64().unwrap_or(0).max(0) as u64;
        Self {
            video_codec: info.get("VideoCodec").str().unwrap_or("").to_string(),
            audio_codec: info.get("AudioCodec").str().unwrap_or("").to_string(),
            bitrate,
            bitrate_text: if bitrate > 0 {
                format_bitrate(bitrate)
            } else {
                String::new()
            },
            width: dimension(info.get("Width")),
            height: dimension(info.get("Height")),
            completion: round1(info.get("CompletionPercentage").f64().unwrap_or(0.0)),
            hw_accel: info.get("VideoEncoderHwAccel").str().unwrap_or("").to_string(),
            reasons: info.get("TranscodeReasons").strings(),
        }
    }
}

fn dimension(f: Field<'_>) -> u32 {
    f.i64()
        .map(|v| v.clamp(0, u32::MAX as i64) as u32)
        .unwrap_or(0)
}

/// Display-ready view of one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySession {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub client: String,
    pub device_name: String,
    pub device_id: String,
    pub remote_end_point: String,

    pub item_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub media_type: String,
    pub year: Option<i32>,

    pub is_paused: bool,
    pub is_muted: bool,
    pub position_ticks: i64,
    pub runtime_ticks: i64,
    pub position: String,
    pub runtime: String,
    pub progress_percent: f64,

    pub play_method: PlayMethod,
    pub quality: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcode_details: Option<TranscodeDetails>,

    pub image_url: String,
    pub user_image_url: String,
}

/// Builds [`DisplaySession`]s. Holds only the image URL prefix.
#[derive(Debug, Clone, Default)]
pub struct SessionNormalizer {
    image_base: Option<String>,
}

impl SessionNormalizer {
    /// `api_base` is `scheme://host:port/<api-root>`; image URLs hang off it.
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            image_base: Some(api_base.into().trim_end_matches('/').to_string()),
        }
    }

    pub fn normalize(&self, raw: &RawSession) -> DisplaySession {
        let item = raw.now_playing();
        let play_state = raw.field("PlayState");

        let item_id = item.get("Id").str().unwrap_or("").to_string();
        let user_id = raw.field("UserId").str().unwrap_or("").to_string();

        let position_ticks = play_state.get("PositionTicks").i64().unwrap_or(0).max(0);
        let runtime_ticks = item.get("RunTimeTicks").i64().unwrap_or(0).max(0);

        let play_method = classify_play_method(raw);
        let transcode_details = (play_method == PlayMethod::Transcode)
            .then(|| TranscodeDetails::from_field(raw.field("TranscodingInfo")));

        DisplaySession {
            id: raw.field("Id").str().unwrap_or("").to_string(),
            user_name: raw.field("UserName").str().unwrap_or("Unknown User").to_string(),
            client: raw.field("Client").str().unwrap_or("Unknown Client").to_string(),
            device_name: raw
                .field("DeviceName")
                .str()
                .unwrap_or("Unknown Device")
                .to_string(),
            device_id: raw.field("DeviceId").str().unwrap_or("").to_string(),
            remote_end_point: raw.field("RemoteEndPoint").str().unwrap_or("").to_string(),

            title: compose_title(item),
            item_type: item.get("Type").str().unwrap_or(UNKNOWN).to_string(),
            media_type: item.get("MediaType").str().unwrap_or("").to_string(),
            year: item
                .get("ProductionYear")
                .i64()
                .and_then(|y| i32::try_from(y).ok()),

            is_paused: play_state.get("IsPaused").bool().unwrap_or(false),
            is_muted: play_state.get("IsMuted").bool().unwrap_or(false),
            position_ticks,
            runtime_ticks,
            position: format_ticks(position_ticks),
            runtime: format_ticks(runtime_ticks),
            progress_percent: progress_percent(position_ticks, runtime_ticks),

            play_method,
            quality: detect_quality(item),
            transcode_details,

            image_url: self.item_image_url(&item_id),
            user_image_url: self.user_image_url(&user_id),
            item_id,
            user_id,
        }
    }

    fn item_image_url(&self, item_id: &str) -> String {
        match (&self.image_base, path_segment(item_id)) {
            (Some(base), Some(id)) => {
                format!("{base}/Items/{id}/Images/Primary?maxWidth={ITEM_IMAGE_WIDTH}")
            }
            _ => String::new(),
        }
    }

    fn user_image_url(&self, user_id: &str) -> String {
        match (&self.image_base, path_segment(user_id)) {
            (Some(base), Some(id)) => {
                format!("{base}/Users/{id}/Images/Primary?maxWidth={USER_IMAGE_WIDTH}")
            }
            _ => String::new(),
        }
    }
}

/// Percent-encode an upstream id for use as one URL path segment.
/// Empty and dot-only ids yield `None`.
fn path_segment(id: &str) -> Option<Cow<'_, str>> {
    if id.is_empty() || id.bytes().all(|b| b == b'.') {
        return None;
    }
    Some(urlencoding::encode(id))
}

/// Normalize without image URLs.
pub fn normalize(raw: &RawSession) -> DisplaySession {
    SessionNormalizer::default().normalize(raw)
}

/// Compose the display title from the now-playing item.
pub fn compose_title(item: Field<'_>) -> String {
    let name = item.get("Name").str().unwrap_or(UNKNOWN);
    let item_type = item.get("Type").str().unwrap_or("");

    if let Some(series) = item.get("SeriesName").str() {
        let season = item.get("ParentIndexNumber").i64();
        let episode = item.get("IndexNumber").i64();
        return match (season, episode) {
            (Some(s), Some(e)) => format!("{series} - S{s:02}E{e:02} - {name}"),
            _ => format!("{series} - {name}"),
        };
    }

    if matches!(item_type, "Audio" | "MusicVideo") {
        let artists = item.get("Artists").strings();
        let artist = if !artists.is_empty() {
            Some(artists.join(", "))
        } else {
            item.get("AlbumArtist").str().map(str::to_string)
        };
        if let Some(artist) = artist {
            return format!("{artist} - {name}");
        }
    }

    name.to_string()
}

/// Percentage of runtime played, one decimal, clamped to `[0, 100]`.
pub fn progress_percent(position_ticks: i64, runtime_ticks: i64) -> f64 {
    if runtime_ticks <= 0 {
        return 0.0;
    }
    let pct = round1(position_ticks.max(0) as f64 / runtime_ticks as f64 * 100.0);
    pct.clamp(0.0, 100.0)
}

/// Direct/stream/transcode classification.
pub fn classify_play_method(raw: &RawSession) -> PlayMethod {
    let info = raw.field("TranscodingInfo");
    if info.is_present() {
        let video_direct = info.get("IsVideoDirect").bool().unwrap_or(false);
        let audio_direct = info.get("IsAudioDirect").bool().unwrap_or(false);
        return match (video_direct, audio_direct) {
            (true, true) => PlayMethod::DirectPlay,
            (true, false) => PlayMethod::DirectStream,
            _ => PlayMethod::Transcode,
        };
    }

    raw.field("PlayState")
        .get("PlayMethod")
        .str()
        .map(PlayMethod::from_upstream)
        .unwrap_or(PlayMethod::Unknown)
}

/// Resolution label and codec of the first video stream.
pub fn detect_quality(item: Field<'_>) -> String {
    let Some(stream) = item
        .get("MediaStreams")
        .array()
        .iter()
        .map(|s| Field(Some(s)))
        .find(|s| s.get("Type").str() == Some("Video"))
    else {
        return String::new();
    };

    let height = stream.get("Height").i64().unwrap_or(0);
    let mut quality = match height {
        h if h >= 2160 => "4K".to_string(),
        h if h >= 1080 => "1080p".to_string(),
        h if h >= 720 => "720p".to_string(),
        h if h > 0 => format!("{h}p"),
        _ => String::new(),
    };

    if let Some(codec) = stream.get("Codec").str() {
        if !quality.is_empty() {
            quality.push(' ');
        }
        quality.push_str(&codec.to_uppercase());
    }

    quality
}
