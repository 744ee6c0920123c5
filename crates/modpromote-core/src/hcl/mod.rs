//! HCL codec for the generated file formats.
//!
//! `body` splits text into blocks and attributes, `value` converts literal
//! expressions to and from JSON values, and `files` knows the layout of
//! each generated file.

pub mod body;
pub mod error;
pub mod files;
pub mod value;

pub use body::{parse_body, Attribute, Block, Body};
pub use error::HclError;
pub use files::{parse_declarations, Declarations};
pub use value::{parse_value, render_value};
