use std::sync::Arc;

use tokio::sync::Mutex;

use crate::board::TaskBoard;
use crate::extraction::GeminiExtractor;
use crate::normalizer::Normalizer;
use crate::store::JsonFileStore;

// Shared by every handler; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JsonFileStore>,
    pub board: Arc<Mutex<TaskBoard>>,
    pub normalizer: Arc<Normalizer<GeminiExtractor>>,
}
