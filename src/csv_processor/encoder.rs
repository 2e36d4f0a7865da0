use std::borrow::Cow;

pub fn needs_quoting(field: &str) -> bool {
    field.contains([',', '"', '\n', '\r'])
        || field.starts_with(char::is_whitespace)
        || field.ends_with(char::is_whitespace)
}

pub fn encode_field(field: &str) -> Cow<'_, str> {
    if !needs_quoting(field) {
        return Cow::Borrowed(field);
    }
    let mut quoted = String::with_capacity(field.len() + 2);
    quoted.push('"');
    for c in field.chars() {
        if c == '"' {
            quoted.push('"');
        }
        quoted.push(c);
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

/// Appends one comma-delimited line (no terminator). Absent values encode as
/// empty fields.
pub fn write_line<'a, I>(out: &mut String, fields: I)
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if let Some(value) = field {
            out.push_str(&encode_field(value));
        }
    }
}

pub fn encode_line<'a, I>(fields: I) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut line = String::new();
    write_line(&mut line, fields);
    line
}
