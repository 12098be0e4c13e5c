//! AT command line building.
//!
//! Parameters that contain a space, double quote, comma or backslash must
//! be quoted and escaped before the modem will accept them:
//!
//! ```text
//! my ssid      ->  "my ssid"
//! say "hi"     ->  "say \"hi\""
//! a,b          ->  "a\,b"
//! ```
//!
//! Every function here is pure; the engine in `bopbox-network` owns the
//! link and the timing.

use bopbox_core::constants::{AT_CMD_TEST, AT_COMMAND_PREFIX};

/// Bytes that force a parameter to be quoted.
const SPECIAL_BYTES: [u8; 4] = [b' ', b'"', b',', b'\\'];

/// Bytes that end the command name in an extended command.
const NAME_TERMINATORS: [u8; 4] = [b'=', b'?', b'\r', b'\n'];

/// Quote and escape a single command parameter if it needs it.
///
/// Parameters without any special byte are returned unchanged. Otherwise a
/// pre-existing pair of surrounding quotes is stripped, every backslash,
/// quote and comma is prefixed with a backslash, and the result is wrapped
/// in one pair of double quotes.
///
/// # Examples
///
/// ```
/// use bopbox_protocol::escape_parameter;
///
/// assert_eq!(escape_parameter(b"plain"), b"plain".to_vec());
/// assert_eq!(escape_parameter(b"my ssid"), b"\"my ssid\"".to_vec());
/// assert_eq!(escape_parameter(b"say \"hi\""), b"\"say \\\"hi\\\"\"".to_vec());
/// assert_eq!(escape_parameter(b"a,b\\c"), b"\"a\\,b\\\\c\"".to_vec());
/// ```
pub fn escape_parameter(param: &[u8]) -> Vec<u8> {
    if !param.iter().any(|b| SPECIAL_BYTES.contains(b)) {
        return param.to_vec();
    }

    let inner = strip_surrounding_quotes(param);

    let mut out = Vec::with_capacity(inner.len() + 8);
    out.push(b'"');
    // Single pass, so an inserted backslash is never escaped a second time
    for &b in inner {
        if matches!(b, b'\\' | b'"' | b',') {
            out.push(b'\\');
        }
        out.push(b);
    }
    out.push(b'"');
    out
}

/// Reverse [`escape_parameter`].
///
/// A quoted parameter has its quotes removed and every backslash escape
/// resolved; anything else is returned unchanged.
pub fn unescape_parameter(param: &[u8]) -> Vec<u8> {
    if !is_quoted(param) {
        return param.to_vec();
    }

    let inner = &param[1..param.len() - 1];
    let mut out = Vec::with_capacity(inner.len());
    let mut bytes = inner.iter();
    while let Some(&b) = bytes.next() {
        if b == b'\\' {
            if let Some(&escaped) = bytes.next() {
                out.push(escaped);
            }
        } else {
            out.push(b);
        }
    }
    out
}

/// Escape and comma-join command parameters.
///
/// Required parameters always appear, in order. Optional parameters that
/// are `None` are left out entirely rather than sent as empty fields.
///
/// # Examples
///
/// ```
/// use bopbox_protocol::build_parameter_list;
///
/// let ssid: &[u8] = b"home wifi";
/// let password: &[u8] = b"secret";
/// let bssid: &[u8] = b"aa:bb";
///
/// let params = build_parameter_list(&[ssid, password], &[None, Some(bssid)]);
/// assert_eq!(params, b"\"home wifi\",secret,aa:bb".to_vec());
/// ```
pub fn build_parameter_list(required: &[&[u8]], optional: &[Option<&[u8]>]) -> Vec<u8> {
    let mut out = Vec::new();
    let present = required.iter().copied().chain(optional.iter().flatten().copied());

    for (i, param) in present.enumerate() {
        if i > 0 {
            out.push(b',');
        }
        out.extend_from_slice(&escape_parameter(param));
    }
    out
}

/// Derive the prefix that marks response lines belonging to `command`.
///
/// The bare test command answers with its own name. Extended commands echo
/// their name with a leading `+`, so the name is scanned from just after
/// `AT+` up to the first `=`, `?`, CR or LF.
///
/// # Examples
///
/// ```
/// use bopbox_protocol::response_prefix;
///
/// assert_eq!(response_prefix(b"AT"), b"AT".to_vec());
/// assert_eq!(response_prefix(b"AT+CWJAP=\"ssid\",pw"), b"+CWJAP".to_vec());
/// assert_eq!(response_prefix(b"AT+CIFSR"), b"+CIFSR".to_vec());
/// assert_eq!(response_prefix(b"AT+CWMODE?\r\n"), b"+CWMODE".to_vec());
/// ```
pub fn response_prefix(command: &[u8]) -> Vec<u8> {
    let command = trim_line_end(command);

    if command == AT_CMD_TEST || !command.starts_with(AT_COMMAND_PREFIX) {
        // Basic commands (AT, ATE0, ...) have no `+NAME` echo
        return command.to_vec();
    }

    let name = &command[AT_COMMAND_PREFIX.len()..];
    let name_len = name
        .iter()
        .position(|b| NAME_TERMINATORS.contains(b))
        .unwrap_or(name.len());

    let mut prefix = Vec::with_capacity(name_len + 1);
    prefix.push(b'+');
    prefix.extend_from_slice(&name[..name_len]);
    prefix
}

fn trim_line_end(mut bytes: &[u8]) -> &[u8] {
    while let [rest @ .., b'\r' | b'\n'] = bytes {
        bytes = rest;
    }
    bytes
}

fn is_quoted(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes.starts_with(b"\"") && bytes.ends_with(b"\"")
}

fn strip_surrounding_quotes(bytes: &[u8]) -> &[u8] {
    if is_quoted(bytes) {
        &bytes[1..bytes.len() - 1]
    } else {
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"ssid".as_slice(), b"ssid".as_slice())]
    #[case(b"", b"")]
    #[case(b"my ssid", b"\"my ssid\"")]
    #[case(b"say \"hi\"", b"\"say \\\"hi\\\"\"")]
    #[case(b"a,b", b"\"a\\,b\"")]
    #[case(b"c:\\dir", b"\"c:\\\\dir\"")]
    #[case(b"\"quoted ssid\"", b"\"quoted ssid\"")]
    #[case(b"\"", b"\"\\\"\"")]
    fn test_escape_parameter(#[case] input: &[u8], #[case] expected: &[u8]) {
        assert_eq!(escape_parameter(input), expected.to_vec());
    }

    #[test]
    fn test_escape_backslash_before_quote() {
        // A literal backslash-quote pair must become \\\" not \\\\\"
        assert_eq!(escape_parameter(b"\\\""), b"\"\\\\\\\"\"".to_vec());
    }

    #[rstest]
    #[case(b"\"my ssid\"".as_slice(), b"my ssid".as_slice())]
    #[case(b"\"a\\,b\"", b"a,b")]
    #[case(b"plain", b"plain")]
    fn test_unescape_parameter(#[case] input: &[u8], #[case] expected: &[u8]) {
        assert_eq!(unescape_parameter(input), expected.to_vec());
    }

    #[test]
    fn test_build_parameter_list_required_only() {
        assert_eq!(build_parameter_list(&[b"1".as_slice()], &[]), b"1".to_vec());
        assert_eq!(build_parameter_list(&[], &[]), Vec::<u8>::new());
    }

    #[test]
    fn test_build_parameter_list_skips_absent_optional() {
        let params = build_parameter_list(
            &[b"net".as_slice(), b"p w".as_slice()],
            &[None, Some(b"x".as_slice()), None],
        );
        assert_eq!(params, b"net,\"p w\",x".to_vec());
    }

    #[test]
    fn test_build_parameter_list_optional_only() {
        let params = build_parameter_list(&[], &[Some(b"a".as_slice()), Some(b"b".as_slice())]);
        assert_eq!(params, b"a,b".to_vec());
    }

    #[rstest]
    #[case(b"AT".as_slice(), b"AT".as_slice())]
    #[case(b"AT\r\n", b"AT")]
    #[case(b"AT+CWJAP=\"ssid\",\"pw\"", b"+CWJAP")]
    #[case(b"AT+CIFSR", b"+CIFSR")]
    #[case(b"AT+CWMODE?", b"+CWMODE")]
    #[case(b"AT+CIPSERVER=1,80", b"+CIPSERVER")]
    #[case(b"AT+CWQAP\r\n", b"+CWQAP")]
    #[case(b"ATE0", b"ATE0")]
    fn test_response_prefix(#[case] command: &[u8], #[case] expected: &[u8]) {
        assert_eq!(response_prefix(command), expected.to_vec());
    }

    fn needs_escaping() -> impl Strategy<Value = Vec<u8>> {
        (
            proptest::collection::vec(any::<u8>(), 0..32),
            prop::sample::select(SPECIAL_BYTES.to_vec()),
            0usize..32,
        )
            .prop_map(|(mut bytes, special, pos)| {
                let pos = pos.min(bytes.len());
                bytes.insert(pos, special);
                bytes
            })
            .prop_filter("already quoted", |bytes| !is_quoted(bytes))
    }

    fn plain_bytes() -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(
            any::<u8>().prop_filter("special", |b| !SPECIAL_BYTES.contains(b)),
            0..32,
        )
    }

    proptest! {
        #[test]
        fn prop_escape_roundtrips(input in needs_escaping()) {
            let escaped = escape_parameter(&input);
            prop_assert_eq!(unescape_parameter(&escaped), input);
        }

        #[test]
        fn prop_escape_wraps_in_one_pair_of_quotes(input in needs_escaping()) {
            let escaped = escape_parameter(&input);
            prop_assert!(is_quoted(&escaped));

            // Every quote inside the wrapper is escaped
            let inner = &escaped[1..escaped.len() - 1];
            let mut preceded_by_escape = false;
            for &b in inner {
                if b == b'"' {
                    prop_assert!(preceded_by_escape);
                }
                preceded_by_escape = b == b'\\' && !preceded_by_escape;
            }
        }

        #[test]
        fn prop_escape_identity_without_specials(input in plain_bytes()) {
            prop_assert_eq!(escape_parameter(&input), input);
        }
    }
}
