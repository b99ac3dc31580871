pub mod locks;
pub mod state;
pub mod store;

pub use locks::SessionLocks;
pub use state::{Cursor, SessionMeta, SessionState};
pub use store::{InMemorySessionStore, SessionStore, StoreError};
