pub mod handlers;
pub mod password;
pub mod token;

pub use token::{Claims, TokenKeys};

/// Loose shape check; the real proof of an address is mail delivery, which
/// this service doesn't do.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}
