pub mod account;
pub mod id;
pub mod linked_identity;
pub mod provider_config;

pub use account::{oauth_source, Account, AccountRequest, USERNAME_MAX_CHARS};
pub use id::{generate_id, AccountId, LinkedIdentityId};
pub use linked_identity::{IdentityState, LinkedIdentity};
pub use provider_config::{ProviderConfig, ProviderKind};
