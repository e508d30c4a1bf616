use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::API_PREFIX;

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

fn user_scoped(base: &str, user_id: &str, suffix: &str) -> String {
    base_join(
        base,
        &format!("{}/users/{}/{}", API_PREFIX, enc(user_id), suffix),
    )
}

pub fn version(base: &str) -> String {
    base_join(base, &format!("{}/version", API_PREFIX))
}
pub fn users(base: &str) -> String {
    base_join(base, &format!("{}/users", API_PREFIX))
}
pub fn user(base: &str, user_id: &str) -> String {
    base_join(base, &format!("{}/users/{}", API_PREFIX, enc(user_id)))
}
pub fn user_by_username(base: &str, username: &str) -> String {
    base_join(
        base,
        &format!("{}/users/username/{}", API_PREFIX, enc(username)),
    )
}
pub fn leaderboard(base: &str, limit: u32) -> String {
    base_join(base, &format!("{}/leaderboard?limit={}", API_PREFIX, limit))
}
pub fn stats(base: &str) -> String {
    base_join(base, &format!("{}/stats", API_PREFIX))
}
pub fn tasks(base: &str) -> String {
    base_join(base, &format!("{}/tasks", API_PREFIX))
}
pub fn user_tasks(base: &str, user_id: &str) -> String {
    user_scoped(base, user_id, "tasks")
}
pub fn complete_task(base: &str, user_id: &str, task_id: &str) -> String {
    user_scoped(base, user_id, &format!("tasks/{}/complete", enc(task_id)))
}
pub fn mining_start(base: &str, user_id: &str) -> String {
    user_scoped(base, user_id, "mining/start")
}
pub fn mining_current(base: &str, user_id: &str) -> String {
    user_scoped(base, user_id, "mining/current")
}
pub fn mining_save(base: &str, user_id: &str, session_id: i32) -> String {
    user_scoped(base, user_id, &format!("mining/{}/save", session_id))
}
pub fn mining_history(base: &str, user_id: &str, limit: u32) -> String {
    user_scoped(base, user_id, &format!("mining/history?limit={}", limit))
}
pub fn mining_session(base: &str, session_id: i32) -> String {
    base_join(base, &format!("{}/mining/{}", API_PREFIX, session_id))
}
pub fn mining_end(base: &str, session_id: i32) -> String {
    base_join(base, &format!("{}/mining/{}/end", API_PREFIX, session_id))
}
pub fn referral(base: &str, user_id: &str) -> String {
    user_scoped(base, user_id, "referral")
}
pub fn referrals(base: &str, user_id: &str) -> String {
    user_scoped(base, user_id, "referrals")
}
pub fn anti_cheat(base: &str, user_id: &str) -> String {
    user_scoped(base, user_id, "anti-cheat")
}
pub fn settings(base: &str, user_id: &str) -> String {
    user_scoped(base, user_id, "settings")
}
pub fn badge_purchases(base: &str) -> String {
    base_join(base, &format!("{}/badge-purchases", API_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_without_double_slashes() {
        assert_eq!(
            mining_save("http://localhost:5151/", "u-1", 7),
            "http://localhost:5151/api/users/u%2D1/mining/7/save"
        );
        assert_eq!(
            leaderboard("http://h", 25),
            "http://h/api/leaderboard?limit=25"
        );
    }

    #[test]
    fn encodes_path_segments() {
        assert_eq!(
            user_by_username("http://h", "a b/c"),
            "http://h/api/users/username/a%20b%2Fc"
        );
    }
}
