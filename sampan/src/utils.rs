use std::char::decode_utf16;
use std::cmp::Ordering;
use std::fmt;
use std::iter::{once, repeat};
use std::str::Chars;
use std::sync::Arc;

use crate::error::{Error, ErrorKind};

/// The name of the escape function templates use unless configured otherwise.
pub const DEFAULT_AUTO_ESCAPE: &str = "html_escape";

/// Controls the autoescaping behavior.
///
/// Autoescaping names a callable of the template namespace (for instance
/// `html_escape`) that every `{{ expression }}` result is passed through
/// before it is written to the output.  `{% raw expr %}` bypasses it.
/// Inside a template the setting is changed with
/// `{% autoescape name %}` or turned off with `{% autoescape None %}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoEscape {
    /// Do not apply auto escaping.
    None,
    /// Pass values through the named function.
    Function(Arc<str>),
}

impl AutoEscape {
    /// Escaping through the built-in `html_escape` function.
    pub fn html() -> AutoEscape {
        AutoEscape::Function(Arc::from(DEFAULT_AUTO_ESCAPE))
    }

    /// Parses the argument of an `autoescape` directive.
    pub fn from_name(name: &str) -> AutoEscape {
        match name {
            "None" | "none" => AutoEscape::None,
            name => AutoEscape::Function(Arc::from(name)),
        }
    }

    /// Returns the name of the escape function.
    pub fn function_name(&self) -> Option<&str> {
        match self {
            AutoEscape::None => None,
            AutoEscape::Function(name) => Some(name),
        }
    }
}

impl Default for AutoEscape {
    fn default() -> AutoEscape {
        AutoEscape::html()
    }
}

/// Helper to HTML escape a string.
///
/// Escapes `&`, `<`, `>`, `"` and `'`.
pub struct HtmlEscape<'a>(pub &'a str);

impl fmt::Display for HtmlEscape<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;
        let mut start = 0;

        for (i, b) in s.bytes().enumerate() {
            let quote = match b {
                b'<' => "&lt;",
                b'>' => "&gt;",
                b'&' => "&amp;",
                b'"' => "&quot;",
                b'\'' => "&#x27;",
                _ => continue,
            };
            if start < i {
                ok!(f.write_str(&s[start..i]));
            }
            ok!(f.write_str(quote));
            start = i + 1;
        }

        if start < s.len() {
            f.write_str(&s[start..])
        } else {
            Ok(())
        }
    }
}

/// Replaces all runs of whitespace and control characters with a single
/// space and trims the result.
pub fn squeeze(s: &str) -> String {
    let mut rv = String::with_capacity(s.len());
    let mut in_gap = false;
    for c in s.chars() {
        if c <= '\x20' {
            in_gap = true;
        } else {
            if in_gap && !rv.is_empty() {
                rv.push(' ');
            }
            in_gap = false;
            rv.push(c);
        }
    }
    rv
}

/// Stable sort with a comparison that can fail.
///
/// The first failing comparison aborts the sort and is returned, the
/// items are left empty in that case.  Unlike `sort_by` this never relies
/// on the comparison being a total order.
pub fn safe_sort<T, F>(items: &mut Vec<T>, mut cmp: F) -> Result<(), Error>
where
    F: FnMut(&T, &T) -> Result<Ordering, Error>,
{
    *items = ok!(merge_sort(std::mem::take(items), &mut cmp));
    Ok(())
}

fn merge_sort<T, F>(mut items: Vec<T>, cmp: &mut F) -> Result<Vec<T>, Error>
where
    F: FnMut(&T, &T) -> Result<Ordering, Error>,
{
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = ok!(merge_sort(items, cmp));
    let right = ok!(merge_sort(right, cmp));

    let mut rv = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        if ok!(cmp(b, a)) == Ordering::Less {
            rv.extend(right.next());
        } else {
            rv.extend(left.next());
        }
    }
    rv.extend(left);
    rv.extend(right);
    Ok(rv)
}

struct Unescaper {
    out: String,
    pending_surrogate: u16,
}

fn bad_escape() -> Error {
    Error::new(ErrorKind::SyntaxError, "bad string escape")
}

impl Unescaper {
    fn unescape(mut self, s: &str) -> Result<String, Error> {
        let mut char_iter = s.chars();

        while let Some(c) = char_iter.next() {
            if c == '\\' {
                match char_iter.next() {
                    None => return Err(bad_escape()),
                    Some(d) => match d {
                        '"' | '\\' | '/' | '\'' => ok!(self.push_char(d)),
                        'b' => ok!(self.push_char('\x08')),
                        'f' => ok!(self.push_char('\x0C')),
                        'n' => ok!(self.push_char('\n')),
                        'r' => ok!(self.push_char('\r')),
                        't' => ok!(self.push_char('\t')),
                        'u' => {
                            let val = ok!(self.parse_u16(&mut char_iter));
                            ok!(self.push_u16(val));
                        }
                        _ => return Err(bad_escape()),
                    },
                }
            } else {
                ok!(self.push_char(c));
            }
        }

        if self.pending_surrogate != 0 {
            Err(bad_escape())
        } else {
            Ok(self.out)
        }
    }

    fn parse_u16(&self, chars: &mut Chars) -> Result<u16, Error> {
        let hexnum = chars.chain(repeat('\0')).take(4).collect::<String>();
        u16::from_str_radix(&hexnum, 16).map_err(|_| bad_escape())
    }

    fn push_u16(&mut self, c: u16) -> Result<(), Error> {
        match (self.pending_surrogate, (0xD800..=0xDFFF).contains(&c)) {
            (0, false) => match decode_utf16(once(c)).next() {
                Some(Ok(c)) => self.out.push(c),
                _ => return Err(bad_escape()),
            },
            (_, false) => return Err(bad_escape()),
            (0, true) => self.pending_surrogate = c,
            (prev, true) => match decode_utf16(once(prev).chain(once(c))).next() {
                Some(Ok(c)) => {
                    self.out.push(c);
                    self.pending_surrogate = 0;
                }
                _ => return Err(bad_escape()),
            },
        }
        Ok(())
    }

    fn push_char(&mut self, c: char) -> Result<(), Error> {
        if self.pending_surrogate != 0 {
            Err(bad_escape())
        } else {
            self.out.push(c);
            Ok(())
        }
    }
}

/// Un-escape a string literal, following JSON rules plus `\'`.
pub fn unescape(s: &str) -> Result<String, Error> {
    Unescaper {
        out: String::new(),
        pending_surrogate: 0,
    }
    .unescape(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_html_escape() {
        let input = "<>&\"'/";
        let output = HtmlEscape(input).to_string();
        assert_eq!(output, "&lt;&gt;&amp;&quot;&#x27;/");
        assert_eq!(HtmlEscape("A \"B\"").to_string(), "A &quot;B&quot;");
    }

    #[test]
    fn test_squeeze() {
        assert_eq!(squeeze("  a \n\t b  c "), "a b c");
        assert_eq!(squeeze(""), "");
    }

    #[test]
    fn test_safe_sort() {
        let mut items = vec![(3, 'a'), (1, 'b'), (3, 'c'), (2, 'd'), (1, 'e')];
        safe_sort(&mut items, |a, b| Ok(a.0.cmp(&b.0))).unwrap();
        assert_eq!(items, vec![(1, 'b'), (1, 'e'), (2, 'd'), (3, 'a'), (3, 'c')]);

        let mut items = vec![1.0, f64::NAN, 0.5];
        let err = safe_sort(&mut items, |a, b| {
            a.partial_cmp(b)
                .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "not comparable"))
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\nb").unwrap(), "a\nb");
        assert_eq!(unescape(r"ä\'").unwrap(), "ä'");
        assert!(unescape(r"\q").is_err());
    }

    #[test]
    fn test_autoescape_from_name() {
        assert_eq!(AutoEscape::from_name("None"), AutoEscape::None);
        assert_eq!(AutoEscape::from_name("html_escape"), AutoEscape::html());
        assert_eq!(AutoEscape::html().function_name(), Some("html_escape"));
    }
}
