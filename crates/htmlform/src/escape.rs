//! HTML escaping and entity decoding.

/// Escapes text content for inclusion between tags.
pub fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escapes a value for inclusion inside a double-quoted attribute.
pub fn escape_attribute(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Decodes the named entities `amp`, `lt`, `gt`, `quot`, `apos` and decimal/hex numeric
/// references. Anything unrecognised is left as written.
pub fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        match candidate.find(';').and_then(|end| {
            decode_one(&candidate[1..end]).map(|decoded| (decoded, end))
        }) {
            Some((decoded, end)) => {
                out.push(decoded);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_one(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let numeric = entity.strip_prefix('#')?;
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_attribute_handles_quotes() {
        assert_eq!(
            escape_attribute(r#"a "b" & 'c'"#),
            "a &quot;b&quot; &amp; &#39;c&#39;"
        );
    }

    #[test]
    fn escape_text_leaves_quotes() {
        assert_eq!(escape_text("<b> \"x\""), "&lt;b&gt; \"x\"");
    }

    #[test]
    fn decode_entities_named_and_numeric() {
        assert_eq!(decode_entities("a &amp; b &lt;&#62; &#x41;"), "a & b <> A");
    }

    #[test]
    fn decode_entities_keeps_unknown_and_bare_ampersand() {
        assert_eq!(decode_entities("&nbsp; & &unknown"), "&nbsp; & &unknown");
    }
}
