//! Export domain models

pub mod artifact;
pub mod identity;
pub mod request;

pub use artifact::*;
pub use identity::*;
pub use request::*;
