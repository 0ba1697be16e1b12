//! Central identity and session management for pettycash.
//! Keep the public surface thin and split implementation across sub-modules.

mod error;
mod token;
mod session_store;
mod manager;
mod authorizer;

pub use error::AuthError;
pub use token::{KeyKind, TokenCodec, TokenPair, TokenPayload};
pub use session_store::{MemorySessionStore, RedisSessionStore, SessionRecord, SessionStore};
pub use manager::{LoginOutcome, RequestContext, SessionManager, UserProfile, WarehouseInfo};
pub use authorizer::{is_public, required_role, Identity};
