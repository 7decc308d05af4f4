use crate::config::Limits;
use crate::error::{StoreError, StoreResult};
use crate::media::MediaStore;
use crate::models::{FeedEntry, Interaction, InteractionKind, MediaUpload, Post, PostInteractions};
use crate::table::CsvTable;
use std::collections::HashSet;
use std::path::Path;
use tokio::sync::RwLock;

const POSTS_FILE: &str = "posts.csv";
const INTERACTIONS_FILE: &str = "interactions.csv";
const UPLOADS_DIR: &str = "uploads";

struct Tables {
    posts: CsvTable<Post>,
    interactions: CsvTable<Interaction>,
}

impl Tables {
    fn post(&self, post_id: &str) -> StoreResult<&Post> {
        self.posts
            .rows()
            .iter()
            .find(|p| p.post_id == post_id)
            .ok_or_else(|| StoreError::not_found("Post"))
    }

    fn for_post<'a>(&'a self, post_id: &'a str) -> impl Iterator<Item = &'a Interaction> + 'a {
        self.interactions
            .rows()
            .iter()
            .filter(move |i| i.post_id == post_id)
    }

    /// Distinct likers, so duplicate rows in a hand-edited file count once.
    fn like_count(&self, post_id: &str) -> usize {
        self.for_post(post_id)
            .filter(|i| i.kind == InteractionKind::Like)
            .map(|i| i.username.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Posts, likes and comments for the whole community, plus their media.
///
/// Both tables sit behind one lock; every mutation persists first and only
/// then updates memory, so a failed write leaves the store as it was.
pub struct PostStore {
    tables: RwLock<Tables>,
    media: MediaStore,
    limits: Limits,
}

impl PostStore {
    pub fn open(data_dir: impl AsRef<Path>, limits: Limits) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref();
        let posts = CsvTable::load(data_dir.join(POSTS_FILE))?;
        let interactions = CsvTable::load(data_dir.join(INTERACTIONS_FILE))?;
        let media = MediaStore::open(data_dir.join(UPLOADS_DIR), limits.max_upload_bytes)?;

        tracing::info!(
            "Opened post store at {} ({} posts, {} interactions)",
            data_dir.display(),
            posts.rows().len(),
            interactions.rows().len()
        );

        Ok(Self {
            tables: RwLock::new(Tables {
                posts,
                interactions,
            }),
            media,
            limits,
        })
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    pub async fn create_post(
        &self,
        username: &str,
        caption: &str,
        media: Option<MediaUpload>,
    ) -> StoreResult<String> {
        let caption = caption.trim();
        if caption.is_empty() && media.is_none() {
            return Err(StoreError::validation(
                "Add a caption or attach an image/video to share",
            ));
        }
        if caption.chars().count() > self.limits.max_caption_chars {
            return Err(StoreError::Validation(format!(
                "Caption is longer than {} characters",
                self.limits.max_caption_chars
            )));
        }
        if let Some(upload) = &media {
            self.media.validate(upload)?;
        }

        let mut post = Post::new(username.to_string(), caption.to_string());
        let mut tables = self.tables.write().await;

        if let Some(upload) = &media {
            post.media_path = Some(self.media.save(&post.post_id, upload)?);
        }

        if let Err(e) = tables.posts.append(post.clone()) {
            if let Some(name) = &post.media_path {
                if let Err(cleanup) = self.media.remove(name) {
                    tracing::warn!("Failed to remove orphaned media {}: {}", name, cleanup);
                }
            }
            return Err(e);
        }

        tracing::info!("Created post {} by {}", post.post_id, username);
        Ok(post.post_id)
    }

    /// All posts, newest first. Posts sharing a timestamp keep the most
    /// recently written one first.
    pub async fn list_posts(&self) -> StoreResult<Vec<Post>> {
        let tables = self.tables.read().await;
        Ok(newest_first(tables.posts.rows().iter()))
    }

    pub async fn list_posts_by(&self, username: &str) -> StoreResult<Vec<Post>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables.posts.rows().iter().filter(|p| p.username == username),
        ))
    }

    pub async fn get_post(&self, post_id: &str) -> StoreResult<Post> {
        let tables = self.tables.read().await;
        tables.post(post_id).cloned()
    }

    pub async fn feed(&self, viewer: Option<&str>) -> StoreResult<Vec<FeedEntry>> {
        let tables = self.tables.read().await;

        Ok(newest_first(tables.posts.rows().iter())
            .into_iter()
            .map(|post| {
                let like_count = tables.like_count(&post.post_id);
                let comment_count = tables
                    .for_post(&post.post_id)
                    .filter(|i| i.kind == InteractionKind::Comment)
                    .count();
                let liked_by_viewer = viewer
                    .map(|v| tables.for_post(&post.post_id).any(|i| i.is_like_by(&post.post_id, v)))
                    .unwrap_or(false);

                FeedEntry {
                    post,
                    like_count,
                    comment_count,
                    liked_by_viewer,
                }
            })
            .collect())
    }

    /// Deletes a post with its interactions and media. Deleting a post that
    /// no longer exists reports `NotFound`.
    pub async fn delete_post(&self, post_id: &str, requesting_user: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        let post = tables.post(post_id)?.clone();
        if post.username != requesting_user {
            return Err(StoreError::Authorization(
                "Only the author can delete this post".to_string(),
            ));
        }

        let previous_posts = tables.posts.rows().to_vec();
        tables.posts.remove_where(|p| p.post_id == post_id)?;

        if let Err(e) = tables.interactions.remove_where(|i| i.post_id == post_id) {
            if let Err(restore) = tables.posts.replace(previous_posts) {
                tracing::error!("Failed to restore posts after aborted delete: {}", restore);
            }
            return Err(e);
        }

        if let Some(name) = &post.media_path {
            if let Err(e) = self.media.remove(name) {
                tracing::warn!("Post {} deleted but media {} remains: {}", post_id, name, e);
            }
        }

        tracing::info!("Deleted post {} by {}", post_id, requesting_user);
        Ok(())
    }

    /// Likes the post, or removes the like if `username` already liked it.
    /// Returns the new like count and whether `username` now likes the post.
    pub async fn toggle_like(
        &self,
        post_id: &str,
        username: &str,
    ) -> StoreResult<(usize, bool)> {
        let mut tables = self.tables.write().await;
        tables.post(post_id)?;

        let already_liked = tables.for_post(post_id).any(|i| i.is_like_by(post_id, username));
        if already_liked {
            tables
                .interactions
                .remove_where(|i| i.is_like_by(post_id, username))?;
        } else {
            tables.interactions.append(Interaction::like(post_id, username))?;
        }

        let count = tables.like_count(post_id);
        tracing::debug!(
            "{} {} post {} ({} likes)",
            username,
            if already_liked { "unliked" } else { "liked" },
            post_id,
            count
        );
        Ok((count, !already_liked))
    }

    pub async fn add_comment(
        &self,
        post_id: &str,
        username: &str,
        text: &str,
    ) -> StoreResult<Interaction> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::validation("Comment cannot be empty"));
        }
        if text.chars().count() > self.limits.max_comment_chars {
            return Err(StoreError::Validation(format!(
                "Comment is longer than {} characters",
                self.limits.max_comment_chars
            )));
        }

        let mut tables = self.tables.write().await;
        tables.post(post_id)?;

        let comment = Interaction::comment(post_id, username, text.to_string());
        tables.interactions.append(comment.clone())?;

        tracing::debug!("{} commented on post {}", username, post_id);
        Ok(comment)
    }

    pub async fn delete_comment(
        &self,
        interaction_id: &str,
        requesting_user: &str,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        let comment = tables
            .interactions
            .rows()
            .iter()
            .find(|i| i.interaction_id == interaction_id && i.kind == InteractionKind::Comment)
            .ok_or_else(|| StoreError::not_found("Comment"))?;

        if comment.username != requesting_user {
            return Err(StoreError::Authorization(
                "Only the author can delete this comment".to_string(),
            ));
        }

        tables
            .interactions
            .remove_where(|i| i.interaction_id == interaction_id)?;
        Ok(())
    }

    pub async fn get_interactions(
        &self,
        post_id: &str,
        viewer: Option<&str>,
    ) -> StoreResult<PostInteractions> {
        let tables = self.tables.read().await;
        tables.post(post_id)?;

        let mut comments: Vec<Interaction> = tables
            .for_post(post_id)
            .filter(|i| i.kind == InteractionKind::Comment)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let viewer_like_id = viewer.and_then(|v| {
            tables
                .for_post(post_id)
                .find(|i| i.is_like_by(post_id, v))
                .map(|i| i.interaction_id.clone())
        });

        Ok(PostInteractions {
            like_count: tables.like_count(post_id),
            comments,
            viewer_like_id,
        })
    }
}

fn newest_first<'a>(posts: impl DoubleEndedIterator<Item = &'a Post>) -> Vec<Post> {
    let mut sorted: Vec<Post> = posts.rev().cloned().collect();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> PostStore {
        PostStore::open(dir.path(), Limits::default()).unwrap()
    }

    fn image() -> MediaUpload {
        MediaUpload::new("sunset.jpg", b"jpeg bytes".to_vec())
    }

    #[tokio::test]
    async fn create_requires_caption_or_media() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);

        let err = store.create_post("asha", "   ", None).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let media_only = store.create_post("asha", "", Some(image())).await.unwrap();
        let caption_only = store.create_post("asha", "hello", None).await.unwrap();

        let ids: Vec<_> = store
            .list_posts()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.post_id)
            .collect();
        assert!(ids.contains(&media_only));
        assert!(ids.contains(&caption_only));
    }

    #[tokio::test]
    async fn caption_limit_counts_characters() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);

        let telugu = "మా".repeat(250);
        assert_eq!(telugu.chars().count(), 500);
        assert!(store.create_post("asha", &telugu, None).await.is_ok());

        let too_long = "a".repeat(501);
        assert!(matches!(
            store.create_post("asha", &too_long, None).await,
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn invalid_media_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);

        let upload = MediaUpload::new("script.sh", b"#!/bin/sh".to_vec());
        assert!(matches!(
            store.create_post("asha", "look", Some(upload)).await,
            Err(StoreError::Validation(_))
        ));
        assert!(store.list_posts().await.unwrap().is_empty());
        assert_eq!(fs::read_dir(store.media().dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn newest_posts_come_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);

        let first = store.create_post("asha", "one", None).await.unwrap();
        let second = store.create_post("ravi", "two", None).await.unwrap();

        let posts = store.list_posts().await.unwrap();
        assert_eq!(posts[0].post_id, second);
        assert_eq!(posts[1].post_id, first);

        let by_asha = store.list_posts_by("asha").await.unwrap();
        assert_eq!(by_asha.len(), 1);
        assert_eq!(by_asha[0].post_id, first);
    }

    #[tokio::test]
    async fn toggle_like_pairs_cancel_out() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let id = store.create_post("asha", "hello", None).await.unwrap();

        assert_eq!(store.toggle_like(&id, "ravi").await.unwrap(), (1, true));
        assert_eq!(store.toggle_like(&id, "asha").await.unwrap(), (2, true));
        assert_eq!(store.toggle_like(&id, "ravi").await.unwrap(), (1, false));

        let seen_by_ravi = store.get_interactions(&id, Some("ravi")).await.unwrap();
        assert_eq!(seen_by_ravi.like_count, 1);
        assert!(seen_by_ravi.viewer_like_id.is_none());

        let seen_by_asha = store.get_interactions(&id, Some("asha")).await.unwrap();
        assert!(seen_by_asha.viewer_like_id.is_some());
    }

    #[tokio::test]
    async fn operations_on_missing_posts_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);

        assert!(matches!(
            store.toggle_like("nope", "ravi").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.add_comment("nope", "ravi", "hi").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.get_interactions("nope", None).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_post("nope", "ravi").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn comments_are_trimmed_and_ordered_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let id = store.create_post("asha", "hello", None).await.unwrap();

        assert!(matches!(
            store.add_comment(&id, "ravi", " \n\t ").await,
            Err(StoreError::Validation(_))
        ));

        store.add_comment(&id, "ravi", "  first  ").await.unwrap();
        store.add_comment(&id, "asha", "second").await.unwrap();

        let interactions = store.get_interactions(&id, None).await.unwrap();
        let texts: Vec<_> = interactions.comments.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(interactions.like_count, 0);
    }

    #[tokio::test]
    async fn only_the_author_deletes_a_comment() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let id = store.create_post("asha", "hello", None).await.unwrap();
        let comment = store.add_comment(&id, "ravi", "nice").await.unwrap();

        assert!(matches!(
            store.delete_comment(&comment.interaction_id, "asha").await,
            Err(StoreError::Authorization(_))
        ));
        store
            .delete_comment(&comment.interaction_id, "ravi")
            .await
            .unwrap();
        assert!(matches!(
            store.delete_comment(&comment.interaction_id, "ravi").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(store.get_interactions(&id, None).await.unwrap().comments.is_empty());
    }

    #[tokio::test]
    async fn non_owner_cannot_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let id = store.create_post("asha", "mine", None).await.unwrap();

        assert!(matches!(
            store.delete_post(&id, "ravi").await,
            Err(StoreError::Authorization(_))
        ));
        assert_eq!(store.get_post(&id).await.unwrap().caption, "mine");
    }

    #[tokio::test]
    async fn owner_delete_cascades() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);

        let keep = store.create_post("ravi", "other", None).await.unwrap();
        let id = store.create_post("asha", "bye", Some(image())).await.unwrap();
        let media_file = store
            .media()
            .path_of(store.get_post(&id).await.unwrap().media_path.as_deref().unwrap());
        assert!(media_file.exists());

        store.toggle_like(&id, "ravi").await.unwrap();
        store.add_comment(&id, "ravi", "nice").await.unwrap();
        store.toggle_like(&keep, "asha").await.unwrap();

        store.delete_post(&id, "asha").await.unwrap();

        assert!(!media_file.exists());
        assert!(matches!(store.get_post(&id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.delete_post(&id, "asha").await,
            Err(StoreError::NotFound(_))
        ));

        let reopened = open(&dir);
        let posts = reopened.list_posts().await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].post_id, keep);
        assert_eq!(reopened.get_interactions(&keep, None).await.unwrap().like_count, 1);

        let raw = fs::read_to_string(dir.path().join(INTERACTIONS_FILE)).unwrap();
        assert!(!raw.contains(&id));
    }

    #[tokio::test]
    async fn feed_reports_counts_for_viewer() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let id = store.create_post("asha", "hello", None).await.unwrap();
        store.toggle_like(&id, "ravi").await.unwrap();
        store.add_comment(&id, "ravi", "hi").await.unwrap();

        let feed = store.feed(Some("ravi")).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].like_count, 1);
        assert_eq!(feed[0].comment_count, 1);
        assert!(feed[0].liked_by_viewer);

        assert!(!store.feed(None).await.unwrap()[0].liked_by_viewer);
    }

    #[tokio::test]
    async fn duplicate_like_rows_count_once_and_unlike_together() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let id = store.create_post("asha", "hello", None).await.unwrap();
        store.toggle_like(&id, "ravi").await.unwrap();

        // A second like row for the same user, as a racing writer could leave.
        let mut interactions: CsvTable<Interaction> =
            CsvTable::load(dir.path().join(INTERACTIONS_FILE)).unwrap();
        interactions.append(Interaction::like(&id, "ravi")).unwrap();

        let store = open(&dir);
        assert_eq!(store.get_interactions(&id, None).await.unwrap().like_count, 1);
        assert_eq!(store.toggle_like(&id, "ravi").await.unwrap(), (0, false));
    }

    /// Puts a non-empty directory where a table file belongs, so the next
    /// write to it fails.
    fn block_file(path: &std::path::Path) {
        let _ = fs::remove_file(path);
        fs::create_dir_all(path.join("blocked")).unwrap();
    }

    #[tokio::test]
    async fn failed_cascade_keeps_the_post() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let id = store.create_post("asha", "hello", None).await.unwrap();
        store.toggle_like(&id, "ravi").await.unwrap();

        block_file(&dir.path().join(INTERACTIONS_FILE));

        assert!(matches!(
            store.delete_post(&id, "asha").await,
            Err(StoreError::Io(_))
        ));
        assert_eq!(store.get_post(&id).await.unwrap().post_id, id);

        let raw = fs::read_to_string(dir.path().join(POSTS_FILE)).unwrap();
        assert!(raw.contains(&id));
    }

    #[tokio::test]
    async fn failed_post_write_removes_saved_media() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);

        block_file(&dir.path().join(POSTS_FILE));

        assert!(store
            .create_post("asha", "sunset", Some(image()))
            .await
            .is_err());
        assert!(store.list_posts().await.unwrap().is_empty());
        assert_eq!(fs::read_dir(store.media().dir()).unwrap().count(), 0);
    }
}
