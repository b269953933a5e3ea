//! Dot/bracket path lookup into a decoded JSON document, e.g. `user.roles[1]`.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum PathError {
    #[error("No value at `{path}` (segment `{segment}`)")]
    NotFound { path: String, segment: String },
    #[error("Malformed path segment `{segment}` in `{path}`")]
    Malformed { path: String, segment: String },
}

pub fn resolve<'a>(root: &'a Value, path: &str) -> Result<&'a Value, PathError> {
    let mut current = root;
    for segment in path.split('.') {
        let (key, index) = split_segment(segment).ok_or_else(|| PathError::Malformed {
            path: String::from(path),
            segment: String::from(segment),
        })?;
        let not_found = || PathError::NotFound {
            path: String::from(path),
            segment: String::from(segment),
        };

        if !key.is_empty() || index.is_none() {
            current = current
                .as_object()
                .and_then(|object| object.get(key))
                .ok_or_else(not_found)?;
        }
        if let Some(index) = index {
            current = current
                .as_array()
                .and_then(|array| array.get(index))
                .ok_or_else(not_found)?;
        }
    }
    Ok(current)
}

fn split_segment(segment: &str) -> Option<(&str, Option<usize>)> {
    match segment.find('[') {
        None if segment.contains(']') => None,
        None => Some((segment, None)),
        Some(open) => {
            let inner = segment[open + 1..].strip_suffix(']')?;
            let index = inner.parse::<usize>().ok()?;
            Some((&segment[..open], Some(index)))
        }
    }
}
