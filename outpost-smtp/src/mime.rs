//! MIME tree walk (spec §4.6 "MIME walk rules").

use mailparse::{MailHeaderMap, ParsedMail};

/// Header-derived facts about one leaf part, carried alongside its body.
#[derive(Debug, Clone, Default)]
pub struct BasicProperties {
    pub subject: Option<String>,
    pub content_type: Option<String>,
    pub from_address: Option<String>,
    /// `Reply-To` if present, else `From`.
    pub reply_address: Option<String>,
}

impl BasicProperties {
    fn from_parsed(mail: &ParsedMail) -> Self {
        let headers = &mail.headers;
        let subject = headers.get_first_value("Subject");
        let content_type = Some(mail.ctype.mimetype.clone());
        let from_address = headers.get_first_value("From");
        let reply_address = headers
            .get_first_value("Reply-To")
            .or_else(|| from_address.clone());

        Self {
            subject,
            content_type,
            from_address,
            reply_address,
        }
    }
}

/// One text leaf of the MIME tree: its properties and raw body bytes.
pub struct Part {
    pub properties: BasicProperties,
    pub body: Vec<u8>,
}

/// Walk `raw_message`'s MIME tree, yielding one [`Part`] per leaf (spec:
/// "a message with multipart content yields ... one per leaf part;
/// non-MIME messages yield a single pair").
///
/// # Errors
/// Returns a message if `raw_message` isn't parseable as a MIME message
/// at all.
pub fn walk(raw_message: &[u8]) -> Result<Vec<Part>, String> {
    let parsed = mailparse::parse_mail(raw_message).map_err(|e| e.to_string())?;
    let mut parts = Vec::new();
    collect_leaves(&parsed, &mut parts);
    Ok(parts)
}

fn collect_leaves(mail: &ParsedMail, out: &mut Vec<Part>) {
    if mail.subparts.is_empty() {
        let body = mail.get_body_raw().unwrap_or_default();
        out.push(Part {
            properties: BasicProperties::from_parsed(mail),
            body,
        });
        return;
    }

    for subpart in &mail.subparts {
        collect_leaves(subpart, out);
    }
}

/// Self-loop guard (spec: "messages whose subject contains the
/// outgoing-subject keyword are ignored").
#[must_use]
pub fn is_self_loop(properties: &BasicProperties, outgoing_subject_keyword: &str) -> bool {
    properties
        .subject
        .as_deref()
        .is_some_and(|subject| subject.contains(outgoing_subject_keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_mime_message_yields_single_part() {
        let raw = b"From: a@example.com\r\nSubject: hi\r\n\r\nbody text\r\n";
        let parts = walk(raw).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].properties.subject.as_deref(), Some("hi"));
    }

    #[test]
    fn reply_to_preferred_over_from() {
        let raw = b"From: a@example.com\r\nReply-To: b@example.com\r\nSubject: hi\r\n\r\nbody\r\n";
        let parts = walk(raw).unwrap();
        assert_eq!(parts[0].properties.reply_address.as_deref(), Some("b@example.com"));
    }

    #[test]
    fn self_loop_guard_matches_keyword() {
        let props = BasicProperties {
            subject: Some("Re: [outpost-reply] something".to_string()),
            ..Default::default()
        };
        assert!(is_self_loop(&props, "[outpost-reply]"));
    }
}
