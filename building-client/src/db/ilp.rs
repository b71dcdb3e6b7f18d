use time::OffsetDateTime;

use crate::domain::Point;

/// Escape measurement/tag keys/tag values/field keys for ILP.
///
/// ILP requires escaping commas, spaces and equals with a backslash.
fn ilp_escape_ident(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            ',' | ' ' | '=' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
}

fn push_tag(out: &mut String, key: &str, value: &str) {
    out.push(',');
    ilp_escape_ident(key, out);
    out.push('=');
    ilp_escape_ident(value, out);
}

fn push_field_f64(out: &mut String, first: &mut bool, key: &str, value: f64) {
    if *first {
        *first = false;
    } else {
        out.push(',');
    }

    ilp_escape_ident(key, out);
    out.push('=');
    // Unsuffixed ILP numbers are doubles.
    out.push_str(&value.to_string());
}

fn ts_to_unix_nanos(ts: OffsetDateTime) -> i128 {
    ts.unix_timestamp_nanos()
}

/// Append one ILP line (without the trailing newline) for `point`.
///
/// Tags become SYMBOL columns and fields DOUBLE columns of the table named
/// after the family.
pub fn write_point_line(point: &Point, out: &mut String) {
    ilp_escape_ident(point.family.measurement(), out);

    for (key, value) in &point.tags {
        push_tag(out, key, value);
    }

    out.push(' ');
    let mut first = true;
    for (field, value) in &point.fields {
        push_field_f64(out, &mut first, field.as_str(), *value);
    }

    out.push(' ');
    out.push_str(&ts_to_unix_nanos(point.timestamp).to_string());
}
