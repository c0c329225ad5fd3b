// Service exports
pub mod cache;
pub mod geocoding;
pub mod notifier;
pub mod postgres;

pub use cache::{CacheError, GeoCache};
pub use geocoding::{GeocodeBackend, GeocodeError, Geocoder};
pub use notifier::{DeliveryReport, NotificationClient, NotifyError};
pub use postgres::{StorageClient, StorageError};
