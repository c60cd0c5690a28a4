pub mod content_type;

pub use content_type::content_type_for;
