//! Request and query bodies for the HTTP API.

pub mod alerts;
pub mod connections;
pub mod sessions;
pub mod transactions;

pub use alerts::*;
pub use connections::*;
pub use sessions::*;
pub use transactions::*;

use validator::ValidationError;

pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}
