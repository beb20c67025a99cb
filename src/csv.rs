//! Minimal CSV reading and writing for bulk import/export.
//!
//! Handles quoted fields with embedded commas, quotes, and line breaks
//! (RFC 4180), which generated content is full of. Nothing more: the
//! import/export surface only ever moves flat string fields.

/// Parse CSV text into rows of fields.
///
/// Accepts both `\n` and `\r\n` line endings. A trailing newline does not
/// produce an empty row.
pub fn parse(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => {
                    row.push(std::mem::take(&mut field));
                }
                '\r' => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                }
                '\n' => {
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                }
                _ => field.push(c),
            }
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

/// Quote a field if it needs quoting.
fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Append one CSV row to `out`.
pub fn write_row(out: &mut String, fields: &[&str]) {
    let mut first = true;
    for field in fields {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&escape(field));
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let rows = parse("a,b,c\nd,e,f\n");
        assert_eq!(rows, vec![vec!["a", "b", "c"], vec!["d", "e", "f"]]);
    }

    #[test]
    fn test_parse_quoted_fields() {
        let rows = parse("keyword,note\n\"one, two\",\"say \"\"hi\"\"\"\n");
        assert_eq!(rows[1], vec!["one, two", "say \"hi\""]);
    }

    #[test]
    fn test_parse_embedded_newline() {
        let rows = parse("a,\"line one\nline two\"\n");
        assert_eq!(rows, vec![vec!["a", "line one\nline two"]]);
    }

    #[test]
    fn test_parse_crlf() {
        let rows = parse("a,b\r\nc,d\r\n");
        assert_eq!(rows, vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn test_round_trip() {
        let fields = ["plain", "with, comma", "with \"quotes\"", "multi\nline"];
        let mut out = String::new();
        write_row(&mut out, &fields);
        let rows = parse(&out);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], fields);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse("").is_empty());
    }
}
