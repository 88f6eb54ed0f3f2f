use std::sync::Arc;

use crate::{
    config::Config,
    database::SocialDatabase,
    engagement::EngagementStore,
    feed::FeedEngine,
    graph::SocialGraph,
    media::LocalImageStore,
    posts::PostStore,
    profiles::ProfileStore,
    publisher::ScheduledPublisher,
};

#[derive(Clone)]
pub struct AppState {
    pub profiles: ProfileStore,
    pub graph: SocialGraph,
    pub feed: FeedEngine,
    pub engagement: EngagementStore,
    pub posts: PostStore,
    pub publisher: Arc<ScheduledPublisher>,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        // Initialize database
        let database = SocialDatabase::new(&config.database.url, config.cache.capacity).await?;
        database.init().await?;
        let database = Arc::new(database);

        let publisher = Arc::new(ScheduledPublisher::new(
            Arc::clone(&database),
            config.publisher.clone(),
            config.cache.capacity,
        ));

        let images = Arc::new(LocalImageStore::new(&config.media.root));

        Ok(Self {
            profiles: ProfileStore::new(Arc::clone(&database)),
            graph: SocialGraph::new(Arc::clone(&database)),
            feed: FeedEngine::new(Arc::clone(&database)),
            engagement: EngagementStore::new(Arc::clone(&database)),
            posts: PostStore::new(Arc::clone(&database), Arc::clone(&publisher), images),
            publisher,
            config,
        })
    }
}
