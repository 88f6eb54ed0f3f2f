// Shared test harness: services over a throwaway SQLite database
// Not every suite uses every helper
#![allow(dead_code)]

use std::sync::Arc;
use tempfile::TempDir;

use feedhub::config::{
    CacheConfig, Config, DatabaseConfig, MediaConfig, PublisherConfig, ServerConfig,
};
use feedhub::database::SocialDatabase;
use feedhub::engagement::EngagementStore;
use feedhub::feed::FeedEngine;
use feedhub::graph::SocialGraph;
use feedhub::media::LocalImageStore;
use feedhub::models::Profile;
use feedhub::posts::PostStore;
use feedhub::profiles::ProfileStore;
use feedhub::publisher::ScheduledPublisher;

pub struct TestContext {
    pub db: Arc<SocialDatabase>,
    pub graph: SocialGraph,
    pub feed: FeedEngine,
    pub engagement: EngagementStore,
    pub profiles: ProfileStore,
    pub posts: PostStore,
    pub publisher: Arc<ScheduledPublisher>,
    // Held so the database file outlives the test
    _dir: TempDir,
}

pub async fn setup() -> TestContext {
    setup_with_publisher_config(PublisherConfig::default()).await
}

pub async fn setup_with_publisher_config(publisher_config: PublisherConfig) -> TestContext {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}/test.db", dir.path().display());

    let db = SocialDatabase::new(&url, 64).await.unwrap();
    db.init().await.unwrap();
    let db = Arc::new(db);

    let publisher = Arc::new(ScheduledPublisher::new(
        Arc::clone(&db),
        publisher_config,
        64,
    ));
    let images = Arc::new(LocalImageStore::new(dir.path().join("media")));

    TestContext {
        graph: SocialGraph::new(Arc::clone(&db)),
        feed: FeedEngine::new(Arc::clone(&db)),
        engagement: EngagementStore::new(Arc::clone(&db)),
        profiles: ProfileStore::new(Arc::clone(&db)),
        posts: PostStore::new(Arc::clone(&db), Arc::clone(&publisher), images),
        publisher,
        db,
        _dir: dir,
    }
}

/// Config for tests that boot the full AppState/router.
pub fn test_config(dir: &TempDir) -> Config {
    Config {
        database: DatabaseConfig {
            url: format!("sqlite://{}/test.db", dir.path().display()),
        },
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        cache: CacheConfig { capacity: 64 },
        media: MediaConfig {
            root: dir.path().join("media").display().to_string(),
        },
        publisher: PublisherConfig::default(),
    }
}

pub async fn create_profile(ctx: &TestContext, username: &str) -> Profile {
    ctx.profiles
        .create_profile(1, username, "")
        .await
        .unwrap()
}
