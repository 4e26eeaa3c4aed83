pub mod file_handlers;
pub mod health_handlers;
pub mod object_handlers;

use axum::http::HeaderValue;

/// `Content-Disposition` value for `kind` (`attachment`/`inline`) naming
/// `file_name`. Non-ASCII names get an RFC 5987 `filename*` alongside an
/// ASCII fallback.
pub(crate) fn content_disposition(kind: &str, file_name: &str) -> HeaderValue {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    let mut value = format!("{}; filename=\"{}\"", kind, fallback);
    if !file_name.is_ascii() {
        let encoded = percent_encoding::utf8_percent_encode(
            file_name,
            percent_encoding::NON_ALPHANUMERIC,
        );
        value.push_str(&format!("; filename*=UTF-8''{}", encoded));
    }

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use super::content_disposition;

    #[test]
    fn plain_names_are_quoted() {
        assert_eq!(
            content_disposition("attachment", "a.txt"),
            "attachment; filename=\"a.txt\""
        );
    }

    #[test]
    fn quotes_and_unicode_are_neutralised() {
        assert_eq!(
            content_disposition("attachment", "say \"hi\".txt"),
            "attachment; filename=\"say _hi_.txt\""
        );
        assert_eq!(
            content_disposition("inline", "é.png"),
            "inline; filename=\"_.png\"; filename*=UTF-8''%C3%A9%2Epng"
        );
    }
}
