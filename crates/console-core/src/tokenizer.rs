//! Argument splitting and numeric parsing for console command lines.

/// Bytes an opening quote may sit past the token start and still be dropped.
pub const MAX_QUOTE_SKIP: usize = 5;

const QUOTE: u8 = b'"';

/// Split `line` on `delimiter` into `tokens`, returning the token count.
///
/// Runs of delimiters never produce empty tokens. A double-quoted section is
/// kept together and the quotes are stripped; an unclosed quote extends to
/// the end of the line. When only one slot is left, it takes the rest of the
/// line with trailing delimiters trimmed.
pub fn split<'a>(line: &'a str, delimiter: u8, tokens: &mut [&'a str]) -> usize {
    let bytes = line.as_bytes();
    let mut count = 0;
    let mut pos = 0;

    while count < tokens.len() {
        while pos < bytes.len() && bytes[pos] == delimiter {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }

        let (start, mut end, next) = scan_token(bytes, pos, delimiter);
        if count + 1 == tokens.len() && has_content(bytes, next, delimiter) {
            end = bytes.len();
            while end > start && bytes[end - 1] == delimiter {
                end -= 1;
            }
        }
        pos = next;

        if let Some(token) = line.get(start..end).filter(|token| !token.is_empty()) {
            tokens[count] = token;
            count += 1;
        }
    }
    count
}

/// Returns `(start, end, next)` for the token beginning at `pos`.
fn scan_token(bytes: &[u8], pos: usize, delimiter: u8) -> (usize, usize, usize) {
    let mut start = pos;
    let mut quoted = false;

    for (index, &byte) in bytes.iter().enumerate().skip(pos) {
        if byte == QUOTE {
            if quoted {
                return (start, index, index + 1);
            }
            quoted = true;
            start = index.min(start + MAX_QUOTE_SKIP) + 1;
        } else if byte == delimiter && !quoted {
            return (start, index, index + 1);
        }
    }
    (start.min(bytes.len()), bytes.len(), bytes.len())
}

fn has_content(bytes: &[u8], from: usize, delimiter: u8) -> bool {
    bytes
        .get(from..)
        .is_some_and(|rest| rest.iter().any(|&byte| byte != delimiter))
}

/// Parse an unsigned decimal number the way the console has always done:
/// leading spaces and a `+` are accepted, parsing stops at the first
/// non-digit, overflow saturates and no digits yields zero.
pub fn parse_u32(text: &str) -> u32 {
    let digits = text.trim_start_matches(' ');
    let digits = digits.strip_prefix('+').unwrap_or(digits);
    accumulate(digits).min(u64::from(u32::MAX)) as u32
}

/// Signed counterpart of [`parse_u32`].
pub fn parse_i32(text: &str) -> i32 {
    let text = text.trim_start_matches(' ');
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let magnitude = accumulate(digits);
    if negative {
        (-(magnitude.min(1 << 31) as i64)) as i32
    } else {
        magnitude.min(i32::MAX as u64) as i32
    }
}

fn accumulate(digits: &str) -> u64 {
    digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u64, |acc, digit| {
            acc.saturating_mul(10)
                .saturating_add(u64::from(digit - b'0'))
                .min(u64::from(u32::MAX) + 1)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_all(line: &str, capacity: usize) -> Vec<&str> {
        let mut tokens = vec![""; capacity];
        let count = split(line, b' ', &mut tokens);
        tokens.truncate(count);
        tokens
    }

    #[test]
    fn splits_on_single_delimiters() {
        assert_eq!(split_all("clock 2024 5 6 7 8 9", 8), ["clock", "2024", "5", "6", "7", "8", "9"]);
    }

    #[test]
    fn collapses_delimiter_runs() {
        assert_eq!(split_all("  a   b  ", 4), ["a", "b"]);
    }

    #[test]
    fn keeps_quoted_section_together() {
        assert_eq!(split_all("set \"a b\" c", 4), ["set", "a b", "c"]);
    }

    #[test]
    fn closing_quote_ends_token() {
        assert_eq!(split_all("\"ab\"cd", 4), ["ab", "cd"]);
    }

    #[test]
    fn unclosed_quote_runs_to_end() {
        assert_eq!(split_all("say \"hello there", 4), ["say", "hello there"]);
    }

    #[test]
    fn last_slot_takes_the_tail() {
        assert_eq!(split_all("one two three  ", 2), ["one", "two three"]);
        assert_eq!(split_all("one two", 2), ["one", "two"]);
    }

    #[test]
    fn empty_inputs_yield_no_tokens() {
        assert!(split_all("", 4).is_empty());
        assert!(split_all("    ", 4).is_empty());
        assert!(split_all("a b", 0).is_empty());
    }

    #[test]
    fn never_writes_past_capacity() {
        let mut tokens = [""; 3];
        assert_eq!(split("a b c d e", b' ', &mut tokens), 3);
        assert_eq!(tokens, ["a", "b", "c d e"]);
    }

    #[test]
    fn parses_unsigned_like_the_console() {
        assert_eq!(parse_u32("1234"), 1234);
        assert_eq!(parse_u32("  +77abc"), 77);
        assert_eq!(parse_u32("abc"), 0);
        assert_eq!(parse_u32("99999999999"), u32::MAX);
    }

    #[test]
    fn parses_signed_with_saturation() {
        assert_eq!(parse_i32("-20"), -20);
        assert_eq!(parse_i32("15x"), 15);
        assert_eq!(parse_i32("9999999999"), i32::MAX);
        assert_eq!(parse_i32("-9999999999"), i32::MIN);
    }
}
