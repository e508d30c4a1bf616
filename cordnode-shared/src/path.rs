use percent_encoding::percent_decode_str;

use crate::api::API_PREFIX;

/// Extracts `{id}` from `/api/users/{id}/...`.
/// Returns a percent-decoded owned [`String`]; `/api/users/username/{name}`
/// is not a user id and yields `None`.
pub fn user_id_from_path(path: &str) -> Option<String> {
    let prefix = format!("{}/users/", API_PREFIX);
    let rest = path.strip_prefix(&prefix)?;
    let seg = rest.split('/').next()?;
    if seg.is_empty() || seg == "username" {
        None
    } else {
        Some(percent_decode_str(seg).decode_utf8_lossy().to_string())
    }
}

/// Extracts the numeric session id from `/api/mining/{session_id}/...` or
/// `/api/users/{id}/mining/{session_id}/save`.
pub fn session_id_from_path(path: &str) -> Option<i32> {
    let mut segs = path.split('/').filter(|s| !s.is_empty());
    while let Some(seg) = segs.next() {
        if seg == "mining" {
            return segs.next()?.parse().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_extraction() {
        assert_eq!(
            user_id_from_path("/api/users/abc%2D1/mining/start").as_deref(),
            Some("abc-1")
        );
        assert_eq!(user_id_from_path("/api/users/xyz").as_deref(), Some("xyz"));
        assert_eq!(user_id_from_path("/api/users/username/bob"), None);
        assert_eq!(user_id_from_path("/api/tasks"), None);
    }

    #[test]
    fn session_id_extraction() {
        assert_eq!(session_id_from_path("/api/mining/12/end"), Some(12));
        assert_eq!(session_id_from_path("/api/users/u/mining/3/save"), Some(3));
        assert_eq!(session_id_from_path("/api/users/u/mining/start"), None);
        assert_eq!(session_id_from_path("/api/stats"), None);
    }
}
