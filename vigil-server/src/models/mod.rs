//! Domain models

pub mod capture;
pub mod detection;
pub mod session;
pub mod user;
pub mod verdict;

pub use capture::{Capture, NewCapture};
pub use detection::{text_detail, Detection, DetectionDetail, NewDetection, CONTEXT_WINDOW};
pub use session::Session;
pub use user::{User, UserProfile};
pub use verdict::Verdict;
