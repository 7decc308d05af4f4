use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use maata::media::{media_kind, MediaKind};
use maata::models::{
    CommentRequest, CreatePostRequest, CreatePostResponse, FeedResponse, Interaction,
    LikeResponse, MediaPayload, Post, PostInteractions, PostListResponse,
};
use maata::user_models::{LoginRequest, LoginResponse, ProfileUpdate, SignupRequest, UserProfile};
use prettytable::{Cell, Row, Table};
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::Path;

const DEFAULT_API_URL: &str = "http://localhost:3000";
const SESSION_FILE: &str = ".maata_session";

#[derive(Parser)]
#[command(name = "maata")]
#[command(about = "Command-line client for the Maata community", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create a new account")]
    Signup {
        #[arg(short, long, help = "Username")]
        username: String,

        #[arg(short, long, help = "Password")]
        password: String,

        #[arg(short, long, help = "Optional email address")]
        email: Option<String>,
    },

    #[command(about = "Log in to your account")]
    Login {
        #[arg(short, long, help = "Username")]
        username: String,

        #[arg(short, long, help = "Password")]
        password: String,
    },

    #[command(about = "Log out of your account")]
    Logout,

    #[command(about = "Show current user")]
    Whoami,

    #[command(about = "Share a new post")]
    Post {
        #[arg(short, long, default_value = "", help = "Caption (up to 500 characters)")]
        caption: String,

        #[arg(short, long, help = "Image or video to attach")]
        media: Option<String>,
    },

    #[command(about = "View community posts")]
    Feed,

    #[command(about = "View posts by one user")]
    Posts {
        #[arg(short, long, help = "Username")]
        username: String,
    },

    #[command(about = "Show a post with its likes and comments")]
    Show {
        #[arg(help = "Post ID")]
        post_id: String,
    },

    #[command(about = "Like a post, or remove your like")]
    Like {
        #[arg(help = "Post ID")]
        post_id: String,
    },

    #[command(about = "Comment on a post")]
    Comment {
        #[arg(help = "Post ID")]
        post_id: String,

        #[arg(short, long, help = "Comment text")]
        text: String,
    },

    #[command(about = "Delete one of your comments")]
    Uncomment {
        #[arg(help = "Comment ID")]
        comment_id: String,
    },

    #[command(about = "Delete one of your posts")]
    Delete {
        #[arg(help = "Post ID")]
        post_id: String,
    },

    #[command(about = "Show your profile")]
    Profile,

    #[command(about = "Edit your profile")]
    EditProfile {
        #[arg(long, help = "Email address")]
        email: Option<String>,

        #[arg(long, help = "A few words about you")]
        about: Option<String>,

        #[arg(long, help = "Date of birth (YYYY-MM-DD)")]
        dob: Option<String>,

        #[arg(long, help = "New password")]
        new_password: Option<String>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Session {
    token: String,
    username: String,
}

impl Session {
    fn save(&self) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(SESSION_FILE, json).context("Failed to write session file")?;
        Ok(())
    }

    fn load() -> Option<Self> {
        let data = fs::read_to_string(SESSION_FILE).ok()?;
        serde_json::from_str(&data).ok()
    }

    fn clear() -> Result<()> {
        if Path::new(SESSION_FILE).exists() {
            fs::remove_file(SESSION_FILE)?;
        }
        Ok(())
    }
}

struct Api {
    client: Client,
    base_url: String,
    session: Option<Session>,
}

impl Api {
    fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: std::env::var("MAATA_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            session: Session::load(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.session {
            Some(session) => builder.bearer_auth(&session.token),
            None => builder,
        }
    }

    fn require_login(&self) -> Result<&Session> {
        self.session.as_ref().ok_or_else(|| {
            anyhow::anyhow!("You must be logged in. Use: maata login -u <username> -p <password>")
        })
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = self
            .authed(builder)
            .send()
            .await
            .context("Failed to reach the Maata server")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v["error"].as_str().map(str::to_string))
                .unwrap_or(text);
            bail!("{} ({})", message, status);
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.send(builder).await?;
        response.json().await.context("Unexpected response from server")
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run_command(cli.command).await {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_command(command: Commands) -> Result<()> {
    let api = Api::new();

    match command {
        Commands::Signup {
            username,
            password,
            email,
        } => signup(&api, username, password, email).await,
        Commands::Login { username, password } => login(&api, username, password).await,
        Commands::Logout => logout(&api).await,
        Commands::Whoami => {
            whoami(&api);
            Ok(())
        }
        Commands::Post { caption, media } => create_post(&api, caption, media).await,
        Commands::Feed => view_feed(&api).await,
        Commands::Posts { username } => view_user_posts(&api, &username).await,
        Commands::Show { post_id } => show_post(&api, &post_id).await,
        Commands::Like { post_id } => toggle_like(&api, &post_id).await,
        Commands::Comment { post_id, text } => add_comment(&api, &post_id, text).await,
        Commands::Uncomment { comment_id } => delete_comment(&api, &comment_id).await,
        Commands::Delete { post_id } => delete_post(&api, &post_id).await,
        Commands::Profile => show_profile(&api).await,
        Commands::EditProfile {
            email,
            about,
            dob,
            new_password,
        } => edit_profile(&api, email, about, dob, new_password).await,
    }
}

async fn signup(
    api: &Api,
    username: String,
    password: String,
    email: Option<String>,
) -> Result<()> {
    let payload = SignupRequest {
        username,
        confirm_password: password.clone(),
        password,
        email,
    };
    let profile: UserProfile = api
        .json(api.client.post(api.url("/users")).json(&payload))
        .await?;

    println!("✅ Account created successfully!");
    println!("👤 Username: {}", profile.username);
    println!("\n💡 You can now log in using: maata login -u {} -p <password>", profile.username);
    Ok(())
}

async fn login(api: &Api, username: String, password: String) -> Result<()> {
    let payload = LoginRequest { username, password };
    let result: LoginResponse = api
        .json(api.client.post(api.url("/login")).json(&payload))
        .await?;

    Session {
        token: result.token,
        username: result.username.clone(),
    }
    .save()?;

    println!("✅ Welcome back, {}!", result.username);
    Ok(())
}

async fn logout(api: &Api) -> Result<()> {
    if api.session.is_some() {
        if let Err(e) = api.send(api.client.post(api.url("/logout"))).await {
            eprintln!("⚠️  Server did not accept logout: {}", e);
        }
    }
    Session::clear()?;
    println!("✅ Logged out successfully!");
    Ok(())
}

fn whoami(api: &Api) {
    match &api.session {
        Some(session) => println!("👤 Logged in as: {}", session.username),
        None => {
            println!("❌ Not logged in");
            println!("💡 Use 'maata login -u <username> -p <password>' to log in");
        }
    }
}

async fn create_post(api: &Api, caption: String, media: Option<String>) -> Result<()> {
    api.require_login()?;

    let media = match media {
        Some(path) => {
            let path = Path::new(&path);
            let bytes = fs::read(path)
                .with_context(|| format!("Failed to read media file {}", path.display()))?;
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload")
                .to_string();
            Some(MediaPayload {
                filename,
                data: STANDARD.encode(bytes),
            })
        }
        None => None,
    };

    let payload = CreatePostRequest { caption, media };
    let result: CreatePostResponse = api
        .json(api.client.post(api.url("/posts")).json(&payload))
        .await?;

    println!("✅ Your post has been shared!");
    println!("🆔 Post ID: {}", result.post_id);
    Ok(())
}

async fn view_feed(api: &Api) -> Result<()> {
    let result: FeedResponse = api.json(api.client.get(api.url("/posts"))).await?;

    if result.posts.is_empty() {
        println!("📭 No posts yet! Be the first to share something.");
        return Ok(());
    }

    println!("\n📢 Community Posts ({})\n", result.posts.len());

    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("ID"),
        Cell::new("User"),
        Cell::new("Posted"),
        Cell::new("Caption"),
        Cell::new("Media"),
        Cell::new("Likes"),
        Cell::new("Comments"),
    ]));

    for entry in result.posts {
        let likes = if entry.liked_by_viewer {
            format!("{} ♥", entry.like_count)
        } else {
            entry.like_count.to_string()
        };
        table.add_row(Row::new(vec![
            Cell::new(&entry.post.post_id),
            Cell::new(&format!("@{}", entry.post.username)),
            Cell::new(&entry.post.timestamp),
            Cell::new(&entry.post.caption),
            Cell::new(&media_label(api, &entry.post)),
            Cell::new(&likes),
            Cell::new(&entry.comment_count.to_string()),
        ]));
    }

    table.printstd();
    println!();
    Ok(())
}

async fn view_user_posts(api: &Api, username: &str) -> Result<()> {
    let result: PostListResponse = api
        .json(api.client.get(api.url(&format!("/users/{}/posts", username))))
        .await?;

    if result.posts.is_empty() {
        println!("📭 @{} hasn't posted anything yet.", username);
        return Ok(());
    }

    println!("\n👤 Posts by @{}\n", username);
    print_posts(api, &result.posts);
    Ok(())
}

async fn show_post(api: &Api, post_id: &str) -> Result<()> {
    let post: Post = api
        .json(api.client.get(api.url(&format!("/posts/{}", post_id))))
        .await?;
    let interactions: PostInteractions = api
        .json(api.client.get(api.url(&format!("/posts/{}/interactions", post_id))))
        .await?;

    println!("\n**@{}**  ·  {}", post.username, post.timestamp);
    if !post.caption.is_empty() {
        println!("{}", post.caption);
    }
    if post.media_path.is_some() {
        println!("📎 {}", media_label(api, &post));
    }
    println!(
        "\n♥ {} like(s){}",
        interactions.like_count,
        if interactions.viewer_like_id.is_some() {
            " (including you)"
        } else {
            ""
        }
    );

    if interactions.comments.is_empty() {
        println!("💬 No comments yet.");
    } else {
        println!("💬 Comments:");
        print_comments(&interactions.comments);
    }
    println!();
    Ok(())
}

async fn toggle_like(api: &Api, post_id: &str) -> Result<()> {
    api.require_login()?;
    let result: LikeResponse = api
        .json(api.client.post(api.url(&format!("/posts/{}/like", post_id))))
        .await?;

    if result.liked {
        println!("♥ Liked! ({} like(s))", result.like_count);
    } else {
        println!("♡ Like removed ({} like(s))", result.like_count);
    }
    Ok(())
}

async fn add_comment(api: &Api, post_id: &str, text: String) -> Result<()> {
    api.require_login()?;
    let comment: Interaction = api
        .json(
            api.client
                .post(api.url(&format!("/posts/{}/comments", post_id)))
                .json(&CommentRequest { text }),
        )
        .await?;

    println!("💬 Comment added (ID: {})", comment.interaction_id);
    Ok(())
}

async fn delete_comment(api: &Api, comment_id: &str) -> Result<()> {
    api.require_login()?;
    api.send(api.client.delete(api.url(&format!("/comments/{}", comment_id))))
        .await?;
    println!("🗑️  Comment deleted");
    Ok(())
}

async fn delete_post(api: &Api, post_id: &str) -> Result<()> {
    api.require_login()?;
    api.send(api.client.delete(api.url(&format!("/posts/{}", post_id))))
        .await?;
    println!("🗑️  Post deleted");
    Ok(())
}

async fn show_profile(api: &Api) -> Result<()> {
    let session = api.require_login()?;
    let profile: UserProfile = api.json(api.client.get(api.url("/profile"))).await?;

    println!("\n👤 {}'s Profile", profile.username);
    println!("   Email: {}", profile.email.as_deref().unwrap_or("-"));
    println!("   About: {}", profile.about.as_deref().unwrap_or("-"));
    println!(
        "   Born:  {}",
        profile
            .date_of_birth
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    );

    let result: PostListResponse = api
        .json(api.client.get(api.url(&format!("/users/{}/posts", session.username))))
        .await?;
    println!("\n#### Your Recent Posts\n");
    if result.posts.is_empty() {
        println!("You haven't made any posts yet.");
    } else {
        print_posts(api, &result.posts);
    }
    Ok(())
}

async fn edit_profile(
    api: &Api,
    email: Option<String>,
    about: Option<String>,
    dob: Option<String>,
    new_password: Option<String>,
) -> Result<()> {
    api.require_login()?;

    let date_of_birth = dob
        .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d"))
        .transpose()
        .context("Date of birth must look like 1999-04-14")?;

    let update = ProfileUpdate {
        email,
        about,
        date_of_birth,
        new_password,
    };
    let profile: UserProfile = api
        .json(api.client.put(api.url("/profile")).json(&update))
        .await?;

    println!("✅ Profile updated for {}", profile.username);
    Ok(())
}

fn print_posts(api: &Api, posts: &[Post]) {
    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("ID"),
        Cell::new("Posted"),
        Cell::new("Caption"),
        Cell::new("Media"),
    ]));
    for post in posts {
        table.add_row(Row::new(vec![
            Cell::new(&post.post_id),
            Cell::new(&post.timestamp),
            Cell::new(&post.caption),
            Cell::new(&media_label(api, post)),
        ]));
    }
    table.printstd();
    println!();
}

fn print_comments(comments: &[Interaction]) {
    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("ID"),
        Cell::new("User"),
        Cell::new("When"),
        Cell::new("Comment"),
    ]));
    for comment in comments {
        table.add_row(Row::new(vec![
            Cell::new(&comment.interaction_id),
            Cell::new(&format!("@{}", comment.username)),
            Cell::new(&comment.timestamp),
            Cell::new(&comment.content),
        ]));
    }
    table.printstd();
}

fn media_label(api: &Api, post: &Post) -> String {
    match &post.media_path {
        Some(name) => {
            let kind = match media_kind(name) {
                Some(MediaKind::Image) => "image",
                Some(MediaKind::Video) => "video",
                None => "file",
            };
            format!("{} {}", kind, api.url(&format!("/media/{}", name)))
        }
        None => "-".to_string(),
    }
}
