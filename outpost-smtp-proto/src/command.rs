//! Wire-level SMTP command parsing.

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use mailparse::MailAddrList;
use tracing::warn;

/// Which greeting verb a client used. The variant doesn't change the
/// resulting state (spec §4.6: both `HELO` and `EHLO` move `INIT ->
/// GREETED`); it's kept so `EHLO`'s multi-line extension banner can be
/// distinguished from `HELO`'s single-line one.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum HeloVariant {
    Ehlo(String),
    Helo(String),
}

impl Display for HeloVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ehlo(_) => "EHLO",
            Self::Helo(_) => "HELO",
        })
    }
}

/// A parsed client command.
#[derive(Debug, Clone)]
pub enum Command {
    Helo(HeloVariant),
    /// `None` is the null reverse-path (`MAIL FROM:<>`).
    MailFrom(Option<MailAddrList>),
    RcptTo(MailAddrList),
    Data,
    Quit,
    Rset,
    StartTls,
    Invalid(String),
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Helo(v) => write!(f, "{v}"),
            Self::MailFrom(addr) => write!(
                f,
                "MAIL FROM:{}",
                addr.clone().map(|a| a.to_string()).unwrap_or_default()
            ),
            Self::RcptTo(addr) => write!(f, "RCPT TO:{addr}"),
            Self::Data => f.write_str("DATA"),
            Self::Quit => f.write_str("QUIT"),
            Self::Rset => f.write_str("RSET"),
            Self::StartTls => f.write_str("STARTTLS"),
            Self::Invalid(s) => f.write_str(s),
        }
    }
}

impl FromStr for Command {
    /// Unparseable input still produces a `Command` (`Invalid`) rather
    /// than failing, since the session needs to reply and count it
    /// toward the bad-command budget either way.
    type Err = std::convert::Infallible;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let upper = line.trim().to_ascii_uppercase();

        if upper.starts_with("MAIL FROM:") {
            return Ok(parse_mail_from(line));
        }
        if upper.starts_with("RCPT TO:") {
            return Ok(parse_rcpt(line));
        }
        if upper.starts_with("EHLO") {
            return Ok(Self::Helo(HeloVariant::Ehlo(arg_of(line))));
        }
        if upper.starts_with("HELO") {
            return Ok(Self::Helo(HeloVariant::Helo(arg_of(line))));
        }

        Ok(match upper.as_str() {
            "DATA" => Self::Data,
            "QUIT" => Self::Quit,
            "RSET" => Self::Rset,
            "STARTTLS" => Self::StartTls,
            _ => Self::Invalid(line.to_string()),
        })
    }
}

fn arg_of(line: &str) -> String {
    line.split(' ').nth(1).unwrap_or_default().trim().to_string()
}

fn parse_mail_from(line: &str) -> Command {
    let Some(colon) = line.find(':') else {
        return Command::Invalid(line.to_string());
    };
    match mailparse::addrparse(line[colon + 1..].trim()) {
        Ok(addrs) if addrs.is_empty() => Command::MailFrom(None),
        Ok(addrs) => Command::MailFrom(Some(addrs)),
        Err(error) => {
            warn!(%error, "unparseable MAIL FROM address");
            Command::Invalid(line.to_string())
        }
    }
}

fn parse_rcpt(line: &str) -> Command {
    let Some(colon) = line.find(':') else {
        return Command::Invalid(line.to_string());
    };
    match mailparse::addrparse(line[colon + 1..].trim()) {
        Ok(addrs) => Command::RcptTo(addrs),
        Err(error) => {
            warn!(%error, "unparseable RCPT TO address");
            Command::Invalid(line.to_string())
        }
    }
}

impl From<&str> for Command {
    fn from(val: &str) -> Self {
        val.parse().unwrap_or_else(|e: std::convert::Infallible| match e {})
    }
}

impl From<&[u8]> for Command {
    fn from(val: &[u8]) -> Self {
        std::str::from_utf8(val).map_or_else(
            |_| Self::Invalid("unable to interpret command as UTF-8".to_string()),
            Self::from,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ehlo_argument() {
        match Command::from("EHLO mail.example.com") {
            Command::Helo(HeloVariant::Ehlo(id)) => assert_eq!(id, "mail.example.com"),
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parses_null_reverse_path() {
        match Command::from("MAIL FROM:<>") {
            Command::MailFrom(None) => {}
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parses_rcpt_to() {
        match Command::from("RCPT TO:<x@example.com>") {
            Command::RcptTo(addrs) => assert_eq!(addrs.to_string(), "<x@example.com>"),
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn unknown_verb_is_invalid() {
        assert!(matches!(Command::from("BOGUS"), Command::Invalid(_)));
    }
}
