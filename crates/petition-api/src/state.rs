use std::sync::Arc;

use petition_db::{Database, PhotoStore};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub photos: Arc<PhotoStore>,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, photos: Arc<PhotoStore>) -> AppState {
        Arc::new(Self { db, photos })
    }

    /// Runs a store call on the blocking pool.
    pub async fn run_db<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&*db)).await?
    }
}
