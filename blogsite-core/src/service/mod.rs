pub mod email;
pub mod email_templates;
pub mod oauth_flow;
pub mod reconciler;
pub mod session;
pub mod token_signer;

pub use email::{DispatchMode, EmailDispatcher, LogMailer, Mailer, OutgoingEmail, RecordingMailer, SmtpMailer};
pub use email_templates::EmailTemplateManager;
pub use oauth_flow::{BindStage, CallbackOutcome, ConfirmedLink, Notice, OAuthFlowService, ProviderLink};
pub use reconciler::{placeholder_username, IdentityReconciler, ReconcileOutcome};
pub use session::{Claims, SessionService};
pub use token_signer::TokenSigner;
