//! REST clients for the bundled vendor integrations.
//!
//! Each client implements both `SubscriptionApi` (webhook subscription
//! lifecycle) and `TaskIntegration` (start / poll / cancel a remote task and
//! decode its completion webhooks).

pub mod deploy;
pub mod http;
pub mod sandbox;

pub use deploy::DeployClient;
pub use sandbox::SandboxClient;
