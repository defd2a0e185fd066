pub mod error;
pub mod store;

pub use error::JournalError;
pub use store::{Align, JournalStore, SheetLayout};
