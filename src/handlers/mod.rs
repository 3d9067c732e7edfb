//! HTTP handlers bridging axum onto the event pipeline.

pub mod file_handlers;
pub mod health_handlers;

use crate::events::EventManager;
use crate::identity::ContentValidator;
use crate::store::Stores;
use std::sync::Arc;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<EventManager>,
    pub stores: Stores,
    pub validator: Arc<ContentValidator>,
}

impl AppState {
    pub fn new(manager: EventManager, stores: Stores, validator: Arc<ContentValidator>) -> Self {
        Self {
            manager: Arc::new(manager),
            stores,
            validator,
        }
    }
}
