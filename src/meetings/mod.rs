pub mod fingerprint;
pub mod meeting;

pub use fingerprint::{fingerprint, EMPTY_FINGERPRINT};
pub use meeting::Meeting;
