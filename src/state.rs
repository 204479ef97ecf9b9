use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::broadcast::ChannelBroadcaster;
use crate::config::Config;
use crate::db::repository::SqliteFeedRepository;
use crate::feed::FeedService;
use crate::storage::DiskImageStore;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub feed: FeedService,
    pub broadcaster: ChannelBroadcaster,
}

impl AppState {
    /// Wire the feed service to SQLite, the uploads directory and an
    /// in-process broadcaster.
    pub fn new(db: DbPool, config: Config) -> Self {
        let broadcaster = ChannelBroadcaster::default();
        let feed = FeedService::new(
            Arc::new(SqliteFeedRepository::new(db.clone())),
            Arc::new(DiskImageStore::new(config.uploads_path())),
            Arc::new(broadcaster.clone()),
            config.feed.per_page,
        );

        Self {
            db,
            config,
            feed,
            broadcaster,
        }
    }
}
