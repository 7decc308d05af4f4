use chrono::Local;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time in the stored timestamp format. The format sorts
/// lexically in chronological order.
pub fn local_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub post_id: String,
    pub username: String,
    pub timestamp: String,
    pub caption: String,
    /// File name inside the uploads directory.
    pub media_path: Option<String>,
}

impl Post {
    pub fn new(username: String, caption: String) -> Self {
        Self {
            post_id: Uuid::new_v4().to_string(),
            username,
            timestamp: local_timestamp(),
            caption,
            media_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Like,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub interaction_id: String,
    pub post_id: String,
    pub username: String,
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    #[serde(default)]
    pub content: String,
    pub timestamp: String,
}

impl Interaction {
    pub fn like(post_id: &str, username: &str) -> Self {
        Self::new(post_id, username, InteractionKind::Like, String::new())
    }

    pub fn comment(post_id: &str, username: &str, text: String) -> Self {
        Self::new(post_id, username, InteractionKind::Comment, text)
    }

    fn new(post_id: &str, username: &str, kind: InteractionKind, content: String) -> Self {
        Self {
            interaction_id: Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            username: username.to_string(),
            kind,
            content,
            timestamp: local_timestamp(),
        }
    }

    pub fn is_like_by(&self, post_id: &str, username: &str) -> bool {
        self.kind == InteractionKind::Like && self.post_id == post_id && self.username == username
    }
}

/// An uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl MediaUpload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostInteractions {
    pub like_count: usize,
    pub comments: Vec<Interaction>,
    pub viewer_like_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEntry {
    #[serde(flatten)]
    pub post: Post,
    pub like_count: usize,
    pub comment_count: usize,
    pub liked_by_viewer: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MediaPayload {
    pub filename: String,
    /// Base64-encoded file contents.
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub caption: String,
    pub media: Option<MediaPayload>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePostResponse {
    pub post_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedResponse {
    pub posts: Vec<FeedEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostListResponse {
    pub posts: Vec<Post>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LikeResponse {
    pub like_count: usize,
    pub liked: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}
