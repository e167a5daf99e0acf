//! Accounts and credential verification.

mod password;
mod users;

pub use password::{
    PASSWORD_HASH_VERSION, PasswordError, SALT_LEN, hash_password, hash_password_with_salt,
    verify_password,
};
pub use users::{UserDirectory, VirtualUser};
