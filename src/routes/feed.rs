use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::broadcast::PostEvent;
use crate::db::models::{Creator, Post};
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::feed::{ImageRef, PostInput};
use crate::state::AppState;
use crate::storage::ImageUpload;

// --- Query / form types ---

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
}

impl ListQuery {
    /// Requested page; anything missing or unparseable means page 1.
    pub fn page(&self) -> u64 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse::<u64>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1)
    }
}

/// Fields of a create/update form. `image` arrives either as a file or,
/// on update, as a text field holding the current image reference.
#[derive(Debug, Default)]
struct PostForm {
    title: Option<String>,
    content: Option<String>,
    image_file: Option<ImageUpload>,
    image_path: Option<String>,
}

impl PostForm {
    async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = PostForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "title" => form.title = Some(field.text().await?),
                "content" => form.content = Some(field.text().await?),
                "image" => {
                    let file_name = field.file_name().map(str::to_string);
                    match file_name {
                        Some(file_name) if !file_name.is_empty() => {
                            let content_type = field.content_type().map(str::to_string);
                            let data = field.bytes().await?;
                            form.image_file = Some(ImageUpload {
                                file_name,
                                content_type,
                                data,
                            });
                        }
                        _ => {
                            let path = field.text().await?;
                            let path = path.trim();
                            if !path.is_empty() {
                                form.image_path = Some(path.to_string());
                            }
                        }
                    }
                }
                _ => tracing::debug!(field = %name, "Ignoring unknown form field"),
            }
        }

        Ok(form)
    }

    fn input(&self) -> PostInput {
        PostInput::new(
            self.title.as_deref().unwrap_or_default(),
            self.content.as_deref().unwrap_or_default(),
        )
    }

    /// A new upload takes precedence over a submitted reference.
    fn image_ref(self) -> Option<ImageRef> {
        match (self.image_file, self.image_path) {
            (Some(upload), _) => Some(ImageRef::Upload(upload)),
            (None, Some(path)) => Some(ImageRef::Existing(path)),
            (None, None) => None,
        }
    }
}

// --- Responses ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostsResponse {
    pub message: &'static str,
    pub posts: Vec<Post>,
    pub total_items: u64,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub message: &'static str,
    pub post: Post,
    pub creator: Creator,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub message: &'static str,
    pub post: Post,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/feed/posts", get(list_posts))
        .route("/feed/post", post(create_post))
        .route(
            "/feed/post/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/feed/ws", get(live_updates))
}

// --- Handlers ---

async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<PostsResponse>> {
    let page = state.feed.list_posts(query.page()).await?;

    Ok(Json(PostsResponse {
        message: "Posts fetched successfully",
        posts: page.posts,
        total_items: page.total_items,
    }))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<CreatedResponse>)> {
    let form = PostForm::read(multipart).await?;
    let created = state
        .feed
        .create_post(form.input(), form.image_file, &user)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            message: "Post created successfully!",
            post: created.post,
            creator: created.creator,
        }),
    ))
}

async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PostResponse>> {
    let post = state.feed.get_post(&id).await?;
    Ok(Json(PostResponse {
        message: "Post fetched",
        post,
    }))
}

async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<PostResponse>)> {
    let form = PostForm::read(multipart).await?;
    let input = form.input();
    let post = state
        .feed
        .update_post(&id, input, form.image_ref(), &user)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PostResponse {
            message: "Post updated!",
            post,
        }),
    ))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    state.feed.delete_post(&id, &user).await?;
    Ok(Json(MessageResponse {
        message: "Post deleted successfully",
    }))
}

async fn live_updates(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let events = state.broadcaster.subscribe();
    ws.on_failed_upgrade(|e| tracing::warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| stream_events(socket, events))
}

/// Forward post events to one client until either side goes away.
async fn stream_events(mut socket: WebSocket, events: broadcast::Receiver<PostEvent>) {
    tracing::debug!("Live feed client connected");
    let mut events = BroadcastStream::new(events);

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(Ok(event)) => {
                    let payload = match serde_json::to_string(&event) {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to encode post event");
                            continue;
                        }
                    };
                    if let Err(e) = socket.send(Message::Text(payload.into())).await {
                        tracing::debug!(error = %e, "Live feed send failed");
                        break;
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "Live feed client lagged");
                }
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!("Live feed client disconnected");
}
