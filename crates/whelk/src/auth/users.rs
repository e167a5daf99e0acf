//! The fixed account roster.

use serde::{Deserialize, Serialize};

use super::password::verify_password;
use crate::vfs::Credentials;

/// An account known to the shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualUser {
    /// Login name, unique.
    pub username: String,
    /// User id.
    pub uid: u32,
    /// Primary group id.
    pub gid: u32,
    /// Home directory.
    pub home: String,
    /// Login shell path.
    pub shell: String,
    /// Stored `twx2$salt$digest` hash.
    pub password_hash: String,
    /// Whether the account may use `sudo`.
    pub sudo: bool,
}

impl VirtualUser {
    /// The account's uid/gid pair.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.uid, self.gid)
    }

    /// Whether this is the superuser.
    pub fn is_root(&self) -> bool {
        self.uid == 0
    }
}

/// The set of accounts. Seeded once at boot; never provisioned at runtime.
#[derive(Debug, Clone)]
pub struct UserDirectory {
    users: Vec<VirtualUser>,
}

impl UserDirectory {
    /// The three seed accounts: `root`, `guest` (sudo) and `operator`.
    pub fn seeded(shell_path: &str) -> Self {
        let seed = [
            (
                "root",
                0,
                "/root",
                "twx2$50f2a4c71e3d9984a4f95d4bc38af6f0$b8376ffdb6a22dd564716785a6a679c4e56103139c7aa84169fdf615482ea92c",
                true,
            ),
            (
                "guest",
                1000,
                "/home/guest",
                "twx2$8c2da3187f09b642a68d11f5937ce2a1$7da4b27b7265869cfbd4fb888599c4bda7690628c9cce06f625c2a250176a208",
                true,
            ),
            (
                "operator",
                1001,
                "/home/operator",
                "twx2$6ab91a7e2f4c8ad0913f75347f2ae6c2$bfb0510ef648d23c5d893fe9a620016df267f5236b007b8c10d7240ea8c20e65",
                false,
            ),
        ];
        Self {
            users: seed
                .into_iter()
                .map(|(name, id, home, hash, sudo)| VirtualUser {
                    username: name.to_string(),
                    uid: id,
                    gid: id,
                    home: home.to_string(),
                    shell: shell_path.to_string(),
                    password_hash: hash.to_string(),
                    sudo,
                })
                .collect(),
        }
    }

    /// Build from an explicit list.
    pub fn from_users(users: Vec<VirtualUser>) -> Self {
        Self { users }
    }

    /// Look up by name.
    pub fn get(&self, username: &str) -> Option<&VirtualUser> {
        self.users.iter().find(|u| u.username == username)
    }

    /// Look up by uid.
    pub fn by_uid(&self, uid: u32) -> Option<&VirtualUser> {
        self.users.iter().find(|u| u.uid == uid)
    }

    /// Name for `uid`, or the uid rendered as a number.
    pub fn name_for_uid(&self, uid: u32) -> String {
        self.by_uid(uid)
            .map(|u| u.username.clone())
            .unwrap_or_else(|| uid.to_string())
    }

    /// Name of the group `gid`, which mirrors the user with the same id.
    pub fn name_for_gid(&self, gid: u32) -> String {
        self.users
            .iter()
            .find(|u| u.gid == gid)
            .map(|u| u.username.clone())
            .unwrap_or_else(|| gid.to_string())
    }

    /// Check a password for `username`. Unknown users never authenticate.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.get(username)
            .is_some_and(|user| verify_password(password, &user.password_hash))
    }

    /// All accounts in seed order.
    pub fn iter(&self) -> impl Iterator<Item = &VirtualUser> {
        self.users.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_roster() {
        let users = UserDirectory::seeded("/bin/bash");
        let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["root", "guest", "operator"]);

        let operator = users.get("operator").unwrap();
        assert_eq!((operator.uid, operator.gid), (1001, 1001));
        assert!(!operator.sudo);
        assert_eq!(operator.shell, "/bin/bash");
        assert_eq!(users.name_for_uid(1000), "guest");
        assert_eq!(users.name_for_uid(4242), "4242");
    }

    #[test]
    fn test_seed_passwords() {
        let users = UserDirectory::seeded("/bin/bash");
        assert!(users.authenticate("guest", "guest"));
        assert!(users.authenticate("operator", "operator"));
        assert!(!users.authenticate("guest", "operator"));
        assert!(!users.authenticate("nobody", "guest"));
    }
}
