//! Post lifecycle: listing, creation, lookup, update and deletion, with
//! ownership checks and a broadcast for every mutation.

use std::sync::Arc;

use crate::broadcast::{Broadcaster, PostEvent};
use crate::db::models::{Creator, NewPost, Post, PostChanges};
use crate::db::repository::FeedRepository;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::storage::{ImageStore, ImageUpload};

const MAX_TITLE_LEN: usize = 200;
const MAX_CONTENT_LEN: usize = 5000;

/// Title and content as submitted, trimmed.
#[derive(Debug, Clone)]
pub struct PostInput {
    pub title: String,
    pub content: String,
}

impl PostInput {
    pub fn new(title: &str, content: &str) -> Self {
        Self {
            title: title.trim().to_string(),
            content: content.trim().to_string(),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        check_field("title", &self.title, MAX_TITLE_LEN)?;
        check_field("content", &self.content, MAX_CONTENT_LEN)
    }
}

fn check_field(name: &str, value: &str, max: usize) -> AppResult<()> {
    if value.is_empty() {
        return Err(AppError::Validation(format!(
            "Validation failed: {name} must not be empty"
        )));
    }
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "Validation failed: {name} must be {max} characters or less"
        )));
    }
    Ok(())
}

/// The image side of an update: a fresh upload, or the reference the
/// client already holds.
#[derive(Debug, Clone)]
pub enum ImageRef {
    Upload(ImageUpload),
    Existing(String),
}

#[derive(Debug, Clone)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub total_items: u64,
}

#[derive(Debug, Clone)]
pub struct CreatedPost {
    pub post: Post,
    pub creator: Creator,
}

#[derive(Clone)]
pub struct FeedService {
    repo: Arc<dyn FeedRepository>,
    images: Arc<dyn ImageStore>,
    broadcaster: Arc<dyn Broadcaster>,
    per_page: u64,
}

fn no_post() -> AppError {
    AppError::NotFound("No post found".into())
}

fn ensure_owner(post: &Post, caller: &CurrentUser) -> AppResult<()> {
    if post.creator.id != caller.id {
        return Err(AppError::Forbidden("Not authorized".into()));
    }
    Ok(())
}

fn ensure_supported(upload: &ImageUpload) -> AppResult<()> {
    if !upload.is_supported() {
        return Err(AppError::Validation(
            "Only png, jpg and jpeg images are accepted".into(),
        ));
    }
    Ok(())
}

impl FeedService {
    pub fn new(
        repo: Arc<dyn FeedRepository>,
        images: Arc<dyn ImageStore>,
        broadcaster: Arc<dyn Broadcaster>,
        per_page: u64,
    ) -> Self {
        Self {
            repo,
            images,
            broadcaster,
            per_page: per_page.max(1),
        }
    }

    /// One page of the feed, newest first. Page numbers start at 1; 0 is
    /// treated as 1.
    #[tracing::instrument(skip(self))]
    pub async fn list_posts(&self, page: u64) -> AppResult<PostPage> {
        let offset = (page.max(1) - 1).saturating_mul(self.per_page);

        let total_items = self.repo.count_posts().await?;
        let posts = self.repo.list_posts(offset, self.per_page).await?;

        Ok(PostPage { posts, total_items })
    }

    #[tracing::instrument(skip(self, input, image, author), fields(author_id = %author.id))]
    pub async fn create_post(
        &self,
        input: PostInput,
        image: Option<ImageUpload>,
        author: &CurrentUser,
    ) -> AppResult<CreatedPost> {
        input.validate()?;
        let upload = image.ok_or_else(|| AppError::Validation("No image provided.".into()))?;
        ensure_supported(&upload)?;

        let user = self
            .repo
            .find_user(&author.id)
            .await?
            .ok_or_else(|| AppError::NotFound("No user found".into()))?;

        let image_url = self.images.save(&upload).await?;
        let new_post = NewPost {
            title: input.title,
            content: input.content,
            image_url: image_url.clone(),
            creator_id: user.id.clone(),
        };
        let post = match self.repo.insert_post(&new_post).await {
            Ok(post) => post,
            Err(e) => {
                self.clear_image(&image_url).await;
                return Err(e.into());
            }
        };

        self.repo.link_post(&user.id, &post.id).await?;
        self.broadcaster.publish(PostEvent::Create(post.clone()));
        tracing::info!(post = %post.id, "Post created");

        Ok(CreatedPost {
            post,
            creator: user.creator(),
        })
    }

    pub async fn get_post(&self, id: &str) -> AppResult<Post> {
        self.repo.find_post(id).await?.ok_or_else(no_post)
    }

    #[tracing::instrument(skip(self, input, image, caller), fields(caller_id = %caller.id))]
    pub async fn update_post(
        &self,
        id: &str,
        input: PostInput,
        image: Option<ImageRef>,
        caller: &CurrentUser,
    ) -> AppResult<Post> {
        input.validate()?;
        let image = image.ok_or_else(|| AppError::Validation("No file picked".into()))?;
        if let ImageRef::Upload(upload) = &image {
            ensure_supported(upload)?;
        }

        let post = self.repo.find_post(id).await?.ok_or_else(no_post)?;
        ensure_owner(&post, caller)?;

        let (image_url, uploaded) = match image {
            ImageRef::Upload(upload) => (self.images.save(&upload).await?, true),
            // A submitted path may only name the image this post already has
            ImageRef::Existing(path) => {
                if path != post.image_url {
                    return Err(AppError::Validation(format!(
                        "Image does not belong to this post: {path}"
                    )));
                }
                (path, false)
            }
        };

        let changes = PostChanges {
            title: input.title,
            content: input.content,
            image_url: image_url.clone(),
        };
        let updated = match self.repo.update_post(id, &changes).await {
            Ok(Some(updated)) => updated,
            outcome => {
                if uploaded {
                    self.clear_image(&image_url).await;
                }
                return Err(match outcome {
                    Err(e) => e.into(),
                    _ => no_post(),
                });
            }
        };

        if image_url != post.image_url {
            self.clear_image(&post.image_url).await;
        }

        self.broadcaster.publish(PostEvent::Update(updated.clone()));
        tracing::info!(post = %updated.id, "Post updated");

        Ok(updated)
    }

    #[tracing::instrument(skip(self, caller), fields(caller_id = %caller.id))]
    pub async fn delete_post(&self, id: &str, caller: &CurrentUser) -> AppResult<()> {
        let post = self.repo.find_post(id).await?.ok_or_else(no_post)?;
        ensure_owner(&post, caller)?;

        self.clear_image(&post.image_url).await;
        if !self.repo.remove_post(id).await? {
            // Removed by a concurrent request after our lookup
            return Err(no_post());
        }
        self.repo.unlink_post(&post.creator.id, id).await?;

        self.broadcaster.publish(PostEvent::Delete(id.to_string()));
        tracing::info!(post = %id, "Post deleted");

        Ok(())
    }

    /// Best-effort removal of an image that is no longer referenced.
    async fn clear_image(&self, path: &str) {
        if let Err(e) = self.images.delete(path).await {
            tracing::warn!(%path, error = %e, "Failed to clear image");
        }
    }
}
