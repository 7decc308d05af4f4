use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use maata::models::{
    CommentRequest, CreatePostRequest, CreatePostResponse, FeedResponse, Interaction,
    LikeResponse, MediaUpload, Post, PostInteractions, PostListResponse,
};
use maata::user_models::{LoginRequest, LoginResponse, ProfileUpdate, SignupRequest, UserProfile};
use maata::{Config, PostStore, SessionRegistry, StoreError, StoreResult, UserStorage};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

struct AppState {
    posts: PostStore,
    users: UserStorage,
    sessions: SessionRegistry,
}

type SharedState = Arc<AppState>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("maata=info,server=info,tower_http=info")),
        )
        .compact()
        .init();

    let config = Config::from_env();

    let posts = PostStore::open(&config.data_dir, config.limits)
        .context("Failed to open post store")?;
    let users = UserStorage::open(config.users_file(), config.bcrypt_cost)
        .context("Failed to open user storage")?;
    let media_dir = posts.media().dir().to_path_buf();

    let state = Arc::new(AppState {
        posts,
        users,
        sessions: SessionRegistry::new(config.session_ttl_hours),
    });

    // Base64 inflates uploads by a third; leave room for the JSON around it.
    let body_limit = (config.limits.max_upload_bytes as usize) / 3 * 4 + 64 * 1024;

    let app = Router::new()
        .route("/users", post(signup))
        .route("/users/:username/posts", get(posts_by_user))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/profile", get(get_profile).put(update_profile))
        .route("/posts", get(feed).post(create_post))
        .route("/posts/:id", get(get_post).delete(delete_post))
        .route("/posts/:id/like", post(toggle_like))
        .route("/posts/:id/interactions", get(get_interactions))
        .route("/posts/:id/comments", post(add_comment))
        .route("/comments/:id", delete(delete_comment))
        .nest_service("/media", ServeDir::new(media_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    tracing::info!(
        "Maata running on http://{} (data in {})",
        config.bind_addr,
        config.data_dir.display()
    );

    axum::serve(listener, app)
        .await
        .context("Server stopped unexpectedly")?;
    Ok(())
}

async fn signup(
    State(state): State<SharedState>,
    Json(payload): Json<SignupRequest>,
) -> StoreResult<(StatusCode, Json<UserProfile>)> {
    let profile = state.users.signup(payload).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> StoreResult<Json<LoginResponse>> {
    let profile = state
        .users
        .authenticate(&payload.username, &payload.password)
        .await?;
    let session = state.sessions.start(&profile.username).await;

    tracing::info!("{} logged in", session.username);
    Ok(Json(LoginResponse {
        token: session.token,
        username: session.username,
    }))
}

async fn logout(State(state): State<SharedState>, headers: HeaderMap) -> StoreResult<StatusCode> {
    let session = state.sessions.require(&headers).await?;
    state.sessions.end(&session.token).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_profile(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> StoreResult<Json<UserProfile>> {
    let session = state.sessions.require(&headers).await?;
    Ok(Json(state.users.get_profile(&session.username).await?))
}

async fn update_profile(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<ProfileUpdate>,
) -> StoreResult<Json<UserProfile>> {
    let session = state.sessions.require(&headers).await?;
    Ok(Json(
        state.users.update_profile(&session.username, payload).await?,
    ))
}

async fn posts_by_user(
    State(state): State<SharedState>,
    Path(username): Path<String>,
) -> StoreResult<Json<PostListResponse>> {
    let posts = state.posts.list_posts_by(&username).await?;
    Ok(Json(PostListResponse { posts }))
}

async fn feed(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> StoreResult<Json<FeedResponse>> {
    let viewer = state.sessions.optional(&headers).await;
    let posts = state
        .posts
        .feed(viewer.as_ref().map(|s| s.username.as_str()))
        .await?;
    Ok(Json(FeedResponse { posts }))
}

async fn create_post(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePostRequest>,
) -> StoreResult<(StatusCode, Json<CreatePostResponse>)> {
    let session = state.sessions.require(&headers).await?;

    let media = match payload.media {
        Some(media) => {
            let bytes = STANDARD
                .decode(media.data.trim())
                .map_err(|_| StoreError::validation("Media data is not valid base64"))?;
            Some(MediaUpload::new(media.filename, bytes))
        }
        None => None,
    };

    let post_id = state
        .posts
        .create_post(&session.username, &payload.caption, media)
        .await?;
    Ok((StatusCode::CREATED, Json(CreatePostResponse { post_id })))
}

async fn get_post(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> StoreResult<Json<Post>> {
    Ok(Json(state.posts.get_post(&id).await?))
}

async fn delete_post(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> StoreResult<StatusCode> {
    let session = state.sessions.require(&headers).await?;
    state.posts.delete_post(&id, &session.username).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_like(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> StoreResult<Json<LikeResponse>> {
    let session = state.sessions.require(&headers).await?;
    let (like_count, liked) = state.posts.toggle_like(&id, &session.username).await?;
    Ok(Json(LikeResponse { like_count, liked }))
}

async fn get_interactions(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> StoreResult<Json<PostInteractions>> {
    let viewer = state.sessions.optional(&headers).await;
    let interactions = state
        .posts
        .get_interactions(&id, viewer.as_ref().map(|s| s.username.as_str()))
        .await?;
    Ok(Json(interactions))
}

async fn add_comment(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<CommentRequest>,
) -> StoreResult<(StatusCode, Json<Interaction>)> {
    let session = state.sessions.require(&headers).await?;
    let comment = state
        .posts
        .add_comment(&id, &session.username, &payload.text)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn delete_comment(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> StoreResult<StatusCode> {
    let session = state.sessions.require(&headers).await?;
    state.posts.delete_comment(&id, &session.username).await?;
    Ok(StatusCode::NO_CONTENT)
}
