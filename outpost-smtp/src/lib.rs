//! The SMTP intake engine: connection handling, TLS upgrade, MIME
//! walking, and the command pipeline dispatch that follows message
//! acceptance (spec §4.6).

pub mod config;
pub mod connection;
pub mod daemon;
pub mod mailer;
pub mod mime;
pub mod session;
pub mod tls;

pub use config::SmtpConfig;
pub use connection::Connection;
pub use daemon::SmtpDaemon;
pub use mailer::{Mailer, SmtpRelayMailer};
pub use session::{Outcome, Session};
