//! Escaping of values interpolated into distinguished names and search filters.
//!
//! Every DN the service builds goes through [`escape_directory_dn`] and every
//! filter assertion value through [`escape_directory_filter`], independently of
//! the form-level validation that already ran on the input.

/// Escape an attribute value for use inside a DN (RFC 4514).
///
/// - `, \ # + < > ; " =` are prefixed with a backslash wherever they occur
/// - a leading or trailing space is prefixed with a backslash
/// - NUL is hex-escaped as `\00`
///
/// # Examples
///
/// ```
/// use registrar::directory::escape_directory_dn;
///
/// assert_eq!(escape_directory_dn("alice"), "alice");
/// assert_eq!(escape_directory_dn("a,b=c"), "a\\,b\\=c");
/// assert_eq!(escape_directory_dn(" x "), "\\ x\\ ");
/// ```
pub fn escape_directory_dn(value: &str) -> String {
    let count = value.chars().count();
    let mut escaped = String::with_capacity(value.len() * 2);

    for (i, ch) in value.chars().enumerate() {
        match ch {
            ',' | '\\' | '#' | '+' | '<' | '>' | ';' | '"' | '=' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            '\0' => escaped.push_str("\\00"),
            ' ' if i == 0 || i + 1 == count => escaped.push_str("\\ "),
            _ => escaped.push(ch),
        }
    }

    escaped
}

/// Escape an assertion value for use inside a search filter (RFC 4515).
///
/// # Examples
///
/// ```
/// use registrar::directory::escape_directory_filter;
///
/// assert_eq!(escape_directory_filter("alice"), "alice");
/// assert_eq!(escape_directory_filter("*)(uid=*"), "\\2a\\29\\28uid=\\2a");
/// ```
pub fn escape_directory_filter(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() * 3);

    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\5c"),
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }

    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    const SPECIALS: &[char] = &[
        ',', '\\', '#', '+', '<', '>', ';', '"', '=', '*', '(', ')', '\0', ' ', 'a', 'z', '_',
    ];

    /// Walk an escaped DN value and report whether any structural character
    /// (or an unescaped edge space) survived.
    fn dn_value_is_inert(escaped: &str) -> bool {
        let chars: Vec<char> = escaped.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '\\' => {
                    let Some(&next) = chars.get(i + 1) else {
                        return false;
                    };
                    if next.is_ascii_hexdigit() && chars.get(i + 2).is_some_and(|c| c.is_ascii_hexdigit()) {
                        i += 3;
                    } else {
                        i += 2;
                    }
                }
                ',' | '+' | '<' | '>' | ';' | '"' | '=' | '#' | '\0' => return false,
                ' ' if i == 0 || i + 1 == chars.len() => return false,
                _ => i += 1,
            }
        }
        true
    }

    fn filter_value_is_inert(escaped: &str) -> bool {
        let chars: Vec<char> = escaped.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '\\' => {
                    let hex_follows = chars.get(i + 1).is_some_and(|c| c.is_ascii_hexdigit())
                        && chars.get(i + 2).is_some_and(|c| c.is_ascii_hexdigit());
                    if !hex_follows {
                        return false;
                    }
                    i += 3;
                }
                '*' | '(' | ')' | '\0' => return false,
                _ => i += 1,
            }
        }
        true
    }

    #[test]
    fn test_escape_dn_plain() {
        assert_eq!(escape_directory_dn(""), "");
        assert_eq!(escape_directory_dn("alice"), "alice");
        assert_eq!(escape_directory_dn("John Doe"), "John Doe");
    }

    #[test]
    fn test_escape_dn_special_chars() {
        assert_eq!(escape_directory_dn("a,b"), "a\\,b");
        assert_eq!(escape_directory_dn("a\\b"), "a\\\\b");
        assert_eq!(escape_directory_dn("a#b"), "a\\#b");
        assert_eq!(escape_directory_dn("a+b"), "a\\+b");
        assert_eq!(escape_directory_dn("a<b>"), "a\\<b\\>");
        assert_eq!(escape_directory_dn("a;b"), "a\\;b");
        assert_eq!(escape_directory_dn("a\"b"), "a\\\"b");
        assert_eq!(escape_directory_dn("a=b"), "a\\=b");
        assert_eq!(escape_directory_dn("a\0b"), "a\\00b");
    }

    #[test]
    fn test_escape_dn_edge_spaces() {
        assert_eq!(escape_directory_dn(" a"), "\\ a");
        assert_eq!(escape_directory_dn("a "), "a\\ ");
        assert_eq!(escape_directory_dn(" "), "\\ ");
        assert_eq!(escape_directory_dn("a b"), "a b");
    }

    #[test]
    fn test_escape_dn_injection_attempt() {
        let escaped = escape_directory_dn("x,ou=admins,dc=example,dc=com");
        assert_eq!(escaped, "x\\,ou\\=admins\\,dc\\=example\\,dc\\=com");
        assert!(dn_value_is_inert(&escaped));
    }

    #[test]
    fn test_escape_filter() {
        assert_eq!(escape_directory_filter("alice"), "alice");
        assert_eq!(escape_directory_filter("a*"), "a\\2a");
        assert_eq!(escape_directory_filter("(admin)"), "\\28admin\\29");
        assert_eq!(escape_directory_filter("a\\b"), "a\\5cb");
        assert_eq!(escape_directory_filter("a\0"), "a\\00");
    }

    #[test]
    fn test_escape_filter_injection_attempt() {
        let escaped = escape_directory_filter("*)(|(uid=*");
        assert!(filter_value_is_inert(&escaped));
        let filter = format!("(uid={escaped})");
        assert_eq!(filter.matches('(').count(), 1);
        assert_eq!(filter.matches(')').count(), 1);
    }

    #[test]
    fn test_escaping_random_special_strings() {
        let mut rng = rand::rng();
        for _ in 0..2000 {
            let len = rng.random_range(0..16);
            let value: String = (0..len)
                .map(|_| SPECIALS[rng.random_range(0..SPECIALS.len())])
                .collect();

            let dn = escape_directory_dn(&value);
            assert!(dn_value_is_inert(&dn), "DN escape leaked for {value:?}: {dn:?}");

            let filter = escape_directory_filter(&value);
            assert!(
                filter_value_is_inert(&filter),
                "filter escape leaked for {value:?}: {filter:?}"
            );
        }
    }
}
