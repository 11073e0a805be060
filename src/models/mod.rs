pub mod comment;
pub mod like;
pub mod post;
pub mod profile;

pub use comment::*;
pub use like::*;
pub use post::*;
pub use profile::*;
