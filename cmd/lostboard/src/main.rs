//! # Lostboard Demo
//!
//! Wires the sync layer to the in-memory backend, seeds a few notices and
//! walks through the screens a signed-in user would see.
//!
//! Usage: `lostboard [keyword]` narrows the board listing by keyword.

mod seed;

use anyhow::Context;
use configs::{LogFormat, Settings};
use domains::{BackendClient, PostStatus, COMMON_LOCATIONS};
use secrecy::ExposeSecret;
use services::{
    Board, Discussion, MyPosts, NotificationCenter, PostFilter, SessionProvider, StatusFilter, SyncOptions,
};
use std::sync::Arc;
use storage_adapters::MemoryBackend;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match settings.log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    init_tracing(&settings);

    if settings
        .backend
        .anon_key
        .as_ref()
        .is_some_and(|k| k.expose_secret().is_empty())
    {
        warn!("backend.anon_key is set but empty");
    }

    let options = SyncOptions {
        fetch_timeout: settings.fetch_timeout(),
        notification_limit: settings.sync.notification_limit,
    };
    let backend = Arc::new(MemoryBackend::new(&settings.backend.url));
    let client = BackendClient::from_backend(backend.clone());
    info!(url = %backend.base_url(), "in-memory backend ready");

    let seeded = seed::run(&client, &options).await?;

    let session = SessionProvider::start(&client, &options).await;
    let me = session
        .sign_in("owner@lostboard.test", seed::DEMO_PASSWORD)
        .await
        .context("demo sign-in failed")?;
    let nickname = session
        .state()
        .profile()
        .map(|p| p.display_name().to_string())
        .unwrap_or_default();
    println!("signed in as {nickname} ({})", me.id);

    let keyword = std::env::args().nth(1).unwrap_or_default();
    let board = Board::open(&client, &options).await;
    let listing = board.visible(&PostFilter {
        keyword: keyword.clone(),
        ..PostFilter::default()
    });
    println!("\nboard ({} of {} open notices, keyword {keyword:?})", listing.len(), board.feed().items().len());
    for post in &listing {
        println!(
            "  #{:<3} [{}] {} ({}) @ {}",
            post.id,
            post.kind.as_str(),
            post.title,
            post.item_category.map(|c| c.label()).unwrap_or("其他"),
            post.location.as_deref().unwrap_or("-")
        );
    }

    println!("\nopen notices by place:");
    for place in COMMON_LOCATIONS {
        let near = board.visible(&PostFilter {
            location: place.to_string(),
            ..PostFilter::default()
        });
        if !near.is_empty() {
            println!("  {place}: {}", near.len());
        }
    }

    let inbox = NotificationCenter::open(&client, me.id, &options).await;
    println!("\nunread notifications: {}", inbox.unread_count());
    for note in inbox.notifications().iter() {
        println!("  {}", note.content);
    }

    if let Some(first) = listing.last() {
        let discussion = Discussion::open(&client, first.id, &options).await;
        println!("\ncomments on {}:", first.title);
        for comment in discussion.comments().iter() {
            println!("  {}: {}", comment.author().name, comment.content);
        }
        discussion.close().await;
    }

    let mine = MyPosts::open(&client, me.id, &options).await;
    if let Some(found) = mine.visible(StatusFilter::Only(PostStatus::Open)).first() {
        mine.mark_found(found.id).await?;
    }
    for post in mine.visible(StatusFilter::All) {
        println!("  #{:<3} {} [{}]", post.id, post.title, post.status.label());
    }
    let tallies = mine.tallies();
    println!(
        "\nmy notices: {} total, {} open, {} closed ({} lost / {} found)",
        tallies.total, tallies.open, tallies.closed, tallies.lost, tallies.found
    );

    inbox.mark_all_as_read().await?;
    info!(owner = %seeded.owner.id, finder = %seeded.finder.id, unread = inbox.unread_count(), "inbox cleared");

    board.close().await;
    inbox.close().await;
    mine.close().await;
    session.sign_out().await?;
    info!(subscriptions = backend.subscription_count(), "demo finished");
    Ok(())
}
