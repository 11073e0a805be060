pub mod comments;
pub mod posts;
pub mod profiles;
pub mod realtime;
