mod api;
mod auth;
mod session;
mod sync;
mod transfer;

pub use api::{ApiClient, ClonePayload, RemoteError};
pub use auth::{current_user, login, logout, LoginResult};
pub use session::{Session, SESSION_FILE};
pub use sync::{clone, fetch, pull, push};
pub use transfer::{for_each_parallel, pool_size};
