use std::sync::Arc;
use tripdeck_booking::{BookingStore, DashboardComposer};
use tripdeck_core::repository::BookingRepository;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub leeway_seconds: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingStore>,
    pub dashboard: Arc<DashboardComposer>,
    pub auth: AuthConfig,
    /// Attach internal error details to 500 responses (development only).
    pub expose_error_details: bool,
}

impl AppState {
    pub fn new(repo: Arc<dyn BookingRepository>, auth: AuthConfig, expose_error_details: bool) -> Self {
        let bookings = Arc::new(BookingStore::new(repo));
        let dashboard = Arc::new(DashboardComposer::new(bookings.clone()));
        Self {
            bookings,
            dashboard,
            auth,
            expose_error_details,
        }
    }
}
