#[derive(Clone)]
struct AppState {
    manager: Arc<SessionManager>,
}

impl AppState {
    fn new(manager: SessionManager) -> Self {
        Self {
            manager: Arc::new(manager),
        }
    }
}
