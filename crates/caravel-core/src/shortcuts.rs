//! Shell command lines used for adjusting ownership and permissions on
//! attached volumes.

/// Formats a `user:group` pair for `chown`. A bare user doubles as the group,
/// matching the behavior of `chown user:user`.
pub fn user_group(user: &str) -> String {
    if user.contains(':') {
        user.to_string()
    } else {
        format!("{0}:{0}", user)
    }
}

/// `chown -R` command for a volume path.
pub fn chown_cmd(user: &str, path: &str) -> String {
    format!("chown -R {} {}", user_group(user), path)
}

/// `chmod -R` command for a volume path. Accepts any mode notation that
/// `chmod` itself accepts.
pub fn chmod_cmd(permissions: &str, path: &str) -> String {
    format!("chmod -R {} {}", permissions, path)
}

/// Extracts the user part of a `user[:group]` value for container creation.
pub fn extract_user(value: &str) -> Option<String> {
    let user = value.split(':').next().unwrap_or_default().trim();
    if user.is_empty() {
        None
    } else {
        Some(user.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_user_becomes_user_group_pair() {
        assert_eq!(user_group("2000"), "2000:2000");
        assert_eq!(user_group("app:web"), "app:web");
    }

    #[test]
    fn builds_preparation_commands() {
        assert_eq!(chown_cmd("2000", "/var/run/app"), "chown -R 2000:2000 /var/run/app");
        assert_eq!(
            chmod_cmd("u=rwX,g=rX,o=", "/var/run/app"),
            "chmod -R u=rwX,g=rX,o= /var/run/app"
        );
    }

    #[test]
    fn extracts_user_part() {
        assert_eq!(extract_user("app:web"), Some("app".to_string()));
        assert_eq!(extract_user(""), None);
    }
}
