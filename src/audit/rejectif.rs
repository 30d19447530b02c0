use crate::models::txt::MAX_STRING_OCTETS;
use crate::models::{RecordConfig, RecordType};

/// A family of records a provider cannot store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectIf {
    TxtHasDoubleQuotes,
    TxtHasBackslash,
    TxtHasTrailingSpace,
    TxtIsEmpty,
    /// The concatenated payload exceeds one character-string.
    TxtLongerThan255,
    TxtHasMultipleStrings,
    LabelNotApex,
    /// An MX with target `.` (RFC 7505 "null MX").
    MxNull,
    CaaTargetContainsWhitespace,
    /// An SRV with target `.`, meaning the service is not offered.
    SrvHasNullTarget,
}

impl RejectIf {
    /// True when `rc` falls into this family.
    pub fn rejects(&self, rc: &RecordConfig) -> bool {
        let txt = || rc.txt_strings.iter();
        match self {
            RejectIf::TxtHasDoubleQuotes => txt().any(|s| s.contains('"')),
            RejectIf::TxtHasBackslash => txt().any(|s| s.contains('\\')),
            RejectIf::TxtHasTrailingSpace => txt().any(|s| s.ends_with(' ')),
            RejectIf::TxtIsEmpty => txt().all(String::is_empty),
            RejectIf::TxtLongerThan255 => rc.txt_concatenated().len() > MAX_STRING_OCTETS,
            RejectIf::TxtHasMultipleStrings => rc.txt_strings.len() > 1,
            RejectIf::LabelNotApex => !rc.is_apex(),
            RejectIf::MxNull => rc.rtype == RecordType::MX && rc.target() == ".",
            RejectIf::CaaTargetContainsWhitespace => {
                rc.rtype == RecordType::CAA && rc.target().contains(char::is_whitespace)
            }
            RejectIf::SrvHasNullTarget => rc.rtype == RecordType::SRV && rc.target() == ".",
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            RejectIf::TxtHasDoubleQuotes => "TXT strings may not contain double quotes",
            RejectIf::TxtHasBackslash => "TXT strings may not contain backslashes",
            RejectIf::TxtHasTrailingSpace => "TXT strings may not end with a space",
            RejectIf::TxtIsEmpty => "TXT records may not be empty",
            RejectIf::TxtLongerThan255 => "TXT records may not be longer than 255 octets",
            RejectIf::TxtHasMultipleStrings => "TXT records may only hold a single string",
            RejectIf::LabelNotApex => "records of this type are only allowed at the apex",
            RejectIf::MxNull => "null MX records are not supported",
            RejectIf::CaaTargetContainsWhitespace => "CAA values may not contain whitespace",
            RejectIf::SrvHasNullTarget => "SRV records may not have a null target",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txt(content: &str) -> RecordConfig {
        RecordConfig::from_string("@", 300, "TXT", content, "example.com").unwrap()
    }

    #[test]
    fn txt_families() {
        assert!(RejectIf::TxtHasDoubleQuotes.rejects(&txt(r#""say \"hi\"""#)));
        assert!(!RejectIf::TxtHasDoubleQuotes.rejects(&txt("plain")));
        assert!(RejectIf::TxtHasBackslash.rejects(&txt(r#""a\\b""#)));
        assert!(RejectIf::TxtHasTrailingSpace.rejects(&txt(r#""x ""#)));
        assert!(RejectIf::TxtIsEmpty.rejects(&txt(r#""""#)));
        assert!(RejectIf::TxtHasMultipleStrings.rejects(&txt(r#""a" "b""#)));
        let long = format!("\"{}\" \"{}\"", "a".repeat(200), "b".repeat(100));
        assert!(RejectIf::TxtLongerThan255.rejects(&txt(&long)));
        assert!(!RejectIf::TxtLongerThan255.rejects(&txt(r#""short""#)));
    }

    #[test]
    fn label_and_mx_families() {
        let www = RecordConfig::from_string("www", 300, "A", "1.2.3.4", "example.com").unwrap();
        assert!(RejectIf::LabelNotApex.rejects(&www));
        let null_mx = RecordConfig::from_string("@", 300, "MX", "0 .", "example.com").unwrap();
        assert!(RejectIf::MxNull.rejects(&null_mx));
        let mx = RecordConfig::from_string("@", 300, "MX", "10 mx", "example.com").unwrap();
        assert!(!RejectIf::MxNull.rejects(&mx));
    }

    #[test]
    fn caa_and_srv_families() {
        let spaced = RecordConfig::from_string("@", 300, "CAA", "0 iodef \"mailto:ca admin@example.com\"", "example.com").unwrap();
        assert!(RejectIf::CaaTargetContainsWhitespace.rejects(&spaced));
        let caa = RecordConfig::from_string("@", 300, "CAA", "0 issue \"letsencrypt.org\"", "example.com").unwrap();
        assert!(!RejectIf::CaaTargetContainsWhitespace.rejects(&caa));

        let refused = RecordConfig::from_string("_sip._tcp", 300, "SRV", "0 0 0 .", "example.com").unwrap();
        assert!(RejectIf::SrvHasNullTarget.rejects(&refused));
        let srv = RecordConfig::from_string("_sip._tcp", 300, "SRV", "10 5 5060 sip", "example.com").unwrap();
        assert!(!RejectIf::SrvHasNullTarget.rejects(&srv));
        assert!(!RejectIf::SrvHasNullTarget.rejects(&caa));
    }
}
