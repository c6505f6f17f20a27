//! Domain models stored in collections.
//!
//! Field names are serialized in camelCase; that spelling is the stored
//! format shared with every other reader of the collections.

pub mod message;
pub mod order;
pub mod product;
pub mod subscriber;
pub mod user;
pub mod verification;

pub use message::{ContactMessage, NewMessage};
pub use order::{AddressSnapshot, CustomerSnapshot, NewOrder, Order, OrderItem};
pub use product::{NewProduct, Product};
pub use subscriber::Subscriber;
pub use user::{NewUser, User};
pub use verification::VerificationCode;

/// Implement [`crate::db::Record`] for a model with `id`, `created_at` and
/// `updated_at` fields.
macro_rules! timestamped_record {
    ($model:ty, $collection:expr) => {
        impl $crate::db::Record for $model {
            const COLLECTION: $crate::backend::Collection = $collection;

            fn id(&self) -> &str {
                self.id.as_str()
            }

            fn created_at(&self) -> ::chrono::DateTime<::chrono::Utc> {
                self.created_at
            }

            fn set_timestamps(
                &mut self,
                created_at: ::chrono::DateTime<::chrono::Utc>,
                updated_at: ::chrono::DateTime<::chrono::Utc>,
            ) {
                self.created_at = created_at;
                self.updated_at = updated_at;
            }
        }
    };
}

pub(crate) use timestamped_record;
