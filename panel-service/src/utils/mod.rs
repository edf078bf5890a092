pub mod code;
pub mod password;
pub mod slug;
pub mod validation;

pub use code::{generate_setup_code, hash_setup_code};
pub use password::{Password, PasswordHashString, PasswordHasher};
pub use slug::{is_valid_slug, normalize_slug};
pub use validation::ValidatedJson;
