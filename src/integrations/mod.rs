//! External service integrations.

pub mod providers {
    pub use crate::providers::*;
}

pub mod decision {
    pub use crate::decision::*;
}
