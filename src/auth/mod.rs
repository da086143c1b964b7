// Authentication module
// Credential storage, the refresh call, and single-flight refresh coordination

mod coordinator;
mod refresh;
mod store;
mod types;

pub use coordinator::{RefreshCoordinator, RefreshLease, RefreshOutcome, Ticket};
pub use refresh::exchange_refresh_token;
pub use store::{CredentialStore, KeyValueStore, MemoryStore, SqliteStore};
pub use types::{
    CredentialPair, LoginRequest, LoginResponse, LoginUser, RefreshedTokens, SessionState,
    SessionUser, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY,
};
