//! Response payloads of the Bilibili web API
//!
//! Only the fields the bot renders are modelled; everything defaults so that
//! upstream additions or omissions never fail deserialization.

use serde::{Deserialize, Serialize};

/// Common `{code, message, data}` envelope
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Zero on success
    pub code: i64,
    /// Error text when `code` is non-zero
    #[serde(default)]
    pub message: String,
    /// Payload
    pub data: Option<T>,
}

/// Uploader of a video
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Owner {
    /// User id
    pub mid: i64,
    /// Display name
    pub name: String,
}

/// Member of a cooperative upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Staff {
    /// User id
    pub mid: i64,
    /// Role in the collaboration
    pub title: String,
    /// Display name
    pub name: String,
}

/// Video counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoStat {
    /// Plays
    pub view: i64,
    /// Danmaku comments
    pub danmaku: i64,
    /// Replies
    pub reply: i64,
    /// Favorites
    pub favorite: i64,
    /// Coins
    pub coin: i64,
    /// Shares
    pub share: i64,
    /// Likes
    pub like: i64,
}

/// Video metadata from `/x/web-interface/view`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoCard {
    /// `BV` id
    pub bvid: String,
    /// Numeric `av` id
    pub aid: i64,
    /// Content id of the first part; identifies the media stream
    pub cid: i64,
    /// Title
    pub title: String,
    /// Cover image URL
    pub pic: String,
    /// Description
    pub desc: String,
    /// Length in seconds
    pub duration: i64,
    /// Publish time (unix seconds)
    pub pubdate: i64,
    /// Uploader
    pub owner: Owner,
    /// Co-uploaders, empty for single-author videos
    pub staff: Vec<Staff>,
    /// Counters
    pub stat: VideoStat,
}

/// Article counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleStats {
    /// Reads
    pub view: i64,
    /// Replies
    pub reply: i64,
    /// Likes
    pub like: i64,
    /// Favorites
    pub favorite: i64,
}

/// Article metadata from `/x/article/viewinfo`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleCard {
    /// Title
    pub title: String,
    /// Author display name
    pub author_name: String,
    /// Cover images
    pub origin_image_urls: Vec<String>,
    /// Counters
    pub stats: ArticleStats,
}

/// Room section of a live room response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomInfo {
    /// Canonical room id
    pub room_id: i64,
    /// Title
    pub title: String,
    /// Cover image URL
    pub cover: String,
    /// 0 offline, 1 live, 2 rotating replays
    pub live_status: i64,
    /// Sub-area name
    pub area_name: String,
    /// Parent area name
    pub parent_area_name: String,
    /// Viewer count
    pub online: i64,
}

/// Streamer identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorBaseInfo {
    /// Display name
    pub uname: String,
}

/// Streamer section of a live room response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorInfo {
    /// Identity
    pub base_info: AnchorBaseInfo,
}

/// Live room from `/xlive/web-room/v1/index/getInfoByRoom`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveCard {
    /// Room details
    pub room_info: RoomInfo,
    /// Streamer details
    pub anchor_info: AnchorInfo,
}

/// Dynamic detail payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicDetail {
    /// The post
    pub item: DynamicItem,
}

/// A feed post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicItem {
    /// Post id
    pub id_str: String,
    /// Rendered modules
    pub modules: DynamicModules,
}

/// Module sections of a post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicModules {
    /// Author header
    pub module_author: ModuleAuthor,
    /// Body
    pub module_dynamic: ModuleDynamic,
}

/// Author header of a post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleAuthor {
    /// Display name
    pub name: String,
    /// Human readable publish time
    pub pub_time: String,
    /// Publish time (unix seconds)
    pub pub_ts: i64,
}

/// Body of a post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleDynamic {
    /// Plain text part
    pub desc: Option<DynamicDesc>,
    /// Attached content
    pub major: Option<DynamicMajor>,
}

/// Text of a post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicDesc {
    /// Text
    pub text: String,
}

/// Attached content of a post; which field is set depends on the post type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicMajor {
    /// Image set
    pub draw: Option<MajorDraw>,
    /// Shared video
    pub archive: Option<MajorArchive>,
    /// Shared article
    pub article: Option<MajorArticle>,
    /// Rich text post
    pub opus: Option<MajorOpus>,
}

/// Image set attachment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MajorDraw {
    /// Images
    pub items: Vec<DrawItem>,
}

/// One image of a set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawItem {
    /// Image URL
    pub src: String,
}

/// Video attachment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MajorArchive {
    /// Title
    pub title: String,
    /// `BV` id
    pub bvid: String,
    /// Cover image URL
    pub cover: String,
}

/// Article attachment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MajorArticle {
    /// Title
    pub title: String,
    /// Cover image URLs
    pub covers: Vec<String>,
}

/// Rich text attachment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MajorOpus {
    /// Title, often empty
    pub title: Option<String>,
    /// Body
    pub summary: Option<DynamicDesc>,
    /// Images
    pub pics: Vec<OpusPic>,
}

/// Image of a rich text post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpusPic {
    /// Image URL
    pub url: String,
}

/// Summary payload from `/x/web-interface/view/conclusion/get`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryData {
    /// Model status: 0 ok, 1 nothing to summarize, -1 unsupported
    pub code: i64,
    /// Model output
    pub model_result: ModelResult,
}

/// Model output of a summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelResult {
    /// Free-text summary
    pub summary: String,
    /// Sectioned outline
    pub outline: Vec<OutlineSection>,
}

/// Outline section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlineSection {
    /// Section title
    pub title: String,
    /// Timestamped points
    pub part_outline: Vec<OutlinePoint>,
}

/// Timestamped outline point
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlinePoint {
    /// Offset into the video in seconds
    pub timestamp: i64,
    /// Text
    pub content: String,
}

/// Play URL payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlayUrlData {
    /// Progressive stream segments
    pub durl: Vec<Durl>,
}

/// One progressive stream segment
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Durl {
    /// Signed media URL
    pub url: String,
    /// Size in bytes
    pub size: i64,
}

/// `nav` payload, only the WBI key images are used
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NavData {
    /// WBI key images
    pub wbi_img: WbiImg,
}

/// URLs whose file stems are the WBI keys
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WbiImg {
    /// Image key URL
    pub img_url: String,
    /// Sub key URL
    pub sub_url: String,
}
