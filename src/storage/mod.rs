pub mod backends;
pub mod template;

pub use template::{ListPage, ObjectStore, StoredObject};
