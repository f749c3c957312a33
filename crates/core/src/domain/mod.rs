pub mod checkpoint;
pub mod comment;
pub mod conversation;
pub mod degradation;
