// src/state.rs

use crate::config::Config;
use crate::store::PostStore;
use crate::upload::UploadManager;
use axum::extract::FromRef;

#[derive(Clone)]
pub struct AppState {
    pub posts: PostStore,
    pub uploads: UploadManager,
    pub config: Config,
}

impl FromRef<AppState> for PostStore {
    fn from_ref(state: &AppState) -> Self {
        state.posts.clone()
    }
}

impl FromRef<AppState> for UploadManager {
    fn from_ref(state: &AppState) -> Self {
        state.uploads.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
