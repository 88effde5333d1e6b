pub mod actor;

pub use actor::{CurrentActor, USER_ID_HEADER};
