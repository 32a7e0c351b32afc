pub mod cascade;
pub mod date;
pub mod sources;
pub mod title;

pub use cascade::DateCascade;
pub use title::{is_login_page, resolve_title};
