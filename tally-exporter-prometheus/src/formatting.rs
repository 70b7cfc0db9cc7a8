//! Helpers for rendering metrics in the text exposition format.

use tally::{LabelSet, MetricKind};

/// Writes a metric type line: `# TYPE <name> <counter|gauge>`.
pub(crate) fn write_type_line(buffer: &mut String, name: &str, kind: MetricKind) {
    buffer.push_str("# TYPE ");
    buffer.push_str(name);
    buffer.push(' ');
    buffer.push_str(kind.as_str());
    buffer.push('\n');
}

/// Writes a sample line: the metric name, the label clause (possibly empty),
/// and the value.
pub(crate) fn write_metric_line(buffer: &mut String, name: &str, label_clause: &str, value: f64) {
    buffer.push_str(name);
    buffer.push_str(label_clause);
    buffer.push(' ');

    let mut float_writer = ryu::Buffer::new();
    buffer.push_str(float_writer.format(value));
    buffer.push('\n');
}

/// Formats a label clause: `{k1="v1",k2="v2"}` with the labels in canonical
/// key order, or the empty string for an empty set.
///
/// Every label value, whatever its type, is rendered inside double quotes.
pub(crate) fn format_label_clause(labels: &LabelSet) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let mut clause = String::with_capacity(16);
    clause.push('{');

    let mut first = true;
    for label in labels.iter() {
        if first {
            first = false;
        } else {
            clause.push(',');
        }
        clause.push_str(label.key());
        clause.push_str("=\"");
        clause.push_str(&escape_label_value(&label.value().to_string()));
        clause.push('"');
    }

    clause.push('}');
    clause
}

/// Escapes a label value for quoting: backslashes, double quotes, and
/// newlines must not appear raw.
pub(crate) fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::{escape_label_value, format_label_clause, write_metric_line, write_type_line};
    use tally::{labels, MetricKind};

    use proptest::prelude::*;

    #[test]
    fn test_escape_label_value_known_cases() {
        let cases = &[
            ("*", "*"),
            ("\"", "\\\""),
            ("\\", "\\\\"),
            ("\\\\", "\\\\\\\\"),
            ("\n", "\\n"),
            ("foo_bar", "foo_bar"),
            ("say \"hi\"\n", "say \\\"hi\\\"\\n"),
        ];

        for (input, expected) in cases {
            assert_eq!(&escape_label_value(input), expected);
        }
    }

    #[test]
    fn test_type_line() {
        let mut buffer = String::new();
        write_type_line(&mut buffer, "requests", MetricKind::Counter);
        assert_eq!(buffer, "# TYPE requests counter\n");
    }

    #[test]
    fn test_metric_line_always_carries_a_decimal_point() {
        let mut buffer = String::new();
        write_metric_line(&mut buffer, "requests", "", 1.0);
        write_metric_line(&mut buffer, "requests", "", 2.5);
        assert_eq!(buffer, "requests 1.0\nrequests 2.5\n");
    }

    #[test]
    fn test_label_clause_is_key_ordered_and_quoted() {
        let clause =
            format_label_clause(&labels! { "response_code" => 404, "action" => "get" });
        assert_eq!(clause, "{action=\"get\",response_code=\"404\"}");
        assert_eq!(format_label_clause(&labels! {}), "");
    }

    proptest! {
        #[test]
        fn test_escaped_values_have_no_raw_specials(input in "[\n\"\\\\]?.*[\n\"\\\\]?") {
            let result = escape_label_value(&input);

            // Raw newlines must never survive.
            prop_assert!(!result.contains('\n'));

            // Strip escaped backslashes, then check that every remaining
            // backslash escapes a quote or an `n`, and every quote is
            // escaped.
            let delayered = result.replace("\\\\", "");
            let as_chars: Vec<char> = delayered.chars().collect();
            prop_assert!(as_chars.first().map_or(true, |c| *c != '"'));
            let bad_escape = as_chars.windows(2).any(|pair| match (pair[0], pair[1]) {
                (c, '"') => c != '\\',
                ('\\', c) => c != 'n' && c != '"',
                _ => false,
            });
            prop_assert!(!bad_escape);
        }

        #[test]
        fn test_escaping_round_trips(input in ".*") {
            // Unescaping the escaped form must reproduce the input.
            let escaped = escape_label_value(&input);
            let mut unescaped = String::new();
            let mut chars = escaped.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    match chars.next() {
                        Some('\\') => unescaped.push('\\'),
                        Some('"') => unescaped.push('"'),
                        Some('n') => unescaped.push('\n'),
                        other => prop_assert!(false, "dangling escape: {:?}", other),
                    }
                } else {
                    unescaped.push(c);
                }
            }
            prop_assert_eq!(unescaped, input);
        }
    }
}
