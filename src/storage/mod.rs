mod channels;
mod items;
mod schema;
mod session;
mod types;

pub use schema::Database;
pub use session::{Session, SessionEnd};
pub use types::{Channel, DatabaseError, Item};
