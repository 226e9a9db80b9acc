//! Wire-level SMTP types shared by the session engine (spec §4.6 C6).

pub mod command;
pub mod extensions;
pub mod state;
pub mod status;

pub use command::{Command, HeloVariant};
pub use extensions::{advertised, Extension};
pub use state::SmtpState;
pub use status::Status;
