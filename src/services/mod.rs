pub mod comment_service;
pub mod post_service;
pub mod profile_service;
pub mod realtime_service;
