/// Maps free-form error or close text to a bounded, metrics-safe key suffix:
/// punctuation and non-ASCII dropped, whitespace runs collapsed to `_`,
/// lowercased. Empty results become `unknown`.
#[must_use]
pub fn metric_key(message: &str) -> String {
    let mut key = String::with_capacity(message.len());
    let mut pending_space = false;
    for ch in message.chars() {
        if ch.is_whitespace() {
            pending_space = true;
        } else if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_space {
                key.push('_');
                pending_space = false;
            }
            key.push(ch.to_ascii_lowercase());
        }
    }
    if pending_space {
        key.push('_');
    }
    if key.is_empty() || key == "_" {
        return "unknown".to_owned();
    }
    key
}

#[cfg(test)]
mod tests {
    use super::metric_key;
    use crate::error::{AppError, AppResult};

    #[test]
    fn keys_are_lowercase_and_underscored() -> AppResult<()> {
        let cases = [
            ("Connection refused (os error 111)", "connection_refused_os_error_111"),
            ("going away", "going_away"),
            ("  leading\tand trailing  ", "_leading_and_trailing_"),
            ("", "unknown"),
            ("!!!", "unknown"),
            ("snake_case stays", "snake_case_stays"),
            ("Überlast!", "berlast"),
        ];
        for (input, expected) in cases {
            let key = metric_key(input);
            if key != expected {
                return Err(AppError::metrics(format!(
                    "metric_key({:?}) = {:?}, expected {:?}",
                    input, key, expected
                )));
            }
        }
        Ok(())
    }
}
