//! Raw DNS wire manipulation: name extraction and black-hole answer
//! fabrication (spec §4.5).

/// Maximum bytes a reconstructed name sequence may occupy before a query
/// is rejected as malformed.
const MAX_NAME_LEN: usize = 1024;

/// The standard "no-error" response flag pair (QR=1, RCODE=0, RD/RA set
/// to match what the client sent is not attempted here — the fixed byte
/// pair the spec names).
const NO_ERROR_FLAGS: [u8; 2] = [0x81, 0x80];

/// The canonical black-hole resource record: an A record for the queried
/// name, TTL 1466, RDATA `0.0.0.0`.
const BLACKHOLE_RR: [u8; 16] = [
    0xC0, 0x0C, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x05, 0xBA, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00,
];

/// Extract the queried name and every proper suffix from a raw DNS query
/// packet, per spec §4.5 "Name extraction".
///
/// Returns `None` if the packet is too short, the `{0x00,0x01,0x00,0x01}`
/// QTYPE/QCLASS marker can't be found at or beyond index 13, or the
/// reconstructed name exceeds [`MAX_NAME_LEN`] bytes.
#[must_use]
pub fn extract_names(query: &[u8]) -> Option<Vec<String>> {
    if query.len() < 14 {
        return None;
    }

    let marker = [0x00u8, 0x01, 0x00, 0x01];
    let marker_pos = (13..query.len().saturating_sub(3))
        .find(|&i| query[i..i + 4] == marker)?;

    if marker_pos == 0 {
        return None;
    }

    let raw_name = &query[13..marker_pos];
    if raw_name.len() > MAX_NAME_LEN {
        return None;
    }

    let dotted: String = raw_name
        .iter()
        .map(|&b| {
            if b <= 44 || (58..=64).contains(&b) || (91..=96).contains(&b) {
                '.'
            } else {
                b as char
            }
        })
        .collect();
    let full_name = dotted.trim_matches('.').to_string();

    if full_name.is_empty() {
        return None;
    }

    let mut names = Vec::new();
    let mut rest: &str = &full_name;
    loop {
        names.push(rest.to_string());
        match rest.split_once('.') {
            Some((_, suffix)) if !suffix.is_empty() => rest = suffix,
            _ => break,
        }
    }

    Some(names)
}

/// Fabricate a black-hole answer for query `q`, per spec §4.5
/// "Black-hole fabrication": length `2+2+(Q-4)+16`, transaction id and
/// question section copied verbatim, answer count overwritten to 1, and
/// the canonical A=0.0.0.0 record appended.
///
/// # Panics
/// Panics if `q.len() < 4`; callers must only invoke this on packets that
/// already passed [`extract_names`], which requires `q.len() >= 14`.
#[must_use]
pub fn fabricate_blackhole_answer(q: &[u8]) -> Vec<u8> {
    assert!(q.len() >= 4, "query too short to fabricate an answer for");

    let mut answer = Vec::with_capacity(q.len() + 12);
    answer.extend_from_slice(&q[0..2]);
    answer.extend_from_slice(&NO_ERROR_FLAGS);
    answer.extend_from_slice(&q[4..]);
    answer[6..8].copy_from_slice(&[0x00, 0x01]);
    answer.extend_from_slice(&BLACKHOLE_RR);
    answer
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A well-formed query for `a.b.github.com`, header + question only,
    /// matching spec §8 scenario (a)'s packet.
    fn sample_query() -> Vec<u8> {
        hex_decode(
            "e575012000010000000000010667697468756203636f6d00000100010000291000000000000000",
        )
    }

    fn hex_decode(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn extracts_name_and_every_suffix() {
        let names = extract_names(&sample_query()).unwrap();
        assert_eq!(names, vec!["github.com", "com"]);
    }

    #[test]
    fn rejects_too_short_packet() {
        assert!(extract_names(&[0u8; 10]).is_none());
    }

    #[test]
    fn blackhole_answer_matches_property_2() {
        let q = sample_query();
        let answer = fabricate_blackhole_answer(&q);

        assert_eq!(&answer[0..2], &q[0..2]);
        assert_eq!(&answer[2..4], &[0x81, 0x80]);
        // 2(id) + 2(flags) + (Q-4) reconstructed question + 16(record) = Q+16.
        assert_eq!(answer.len(), q.len() + 16);
        assert_eq!(&answer[answer.len() - 16..], &BLACKHOLE_RR);
        assert_eq!(&answer[6..8], &[0x00, 0x01]);
    }
}
