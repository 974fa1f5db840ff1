pub mod activity;
pub mod dashboard;
pub mod memory;
pub mod models;
pub mod normalize;
pub mod ownership;
pub mod stats;
pub mod store;

pub use dashboard::{Dashboard, DashboardComposer};
pub use memory::InMemoryBookingRepository;
pub use models::{BookingStatus, NormalizedBooking, Price};
pub use normalize::normalize;
pub use store::BookingStore;
