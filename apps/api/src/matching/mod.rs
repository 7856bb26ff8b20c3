pub mod handlers;
pub mod scorer;
pub mod vector_index;
