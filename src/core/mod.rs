// Domain-layer modules and shared errors/models
pub mod pipeline {
    pub use crate::pipeline::*;
}

pub mod scoring {
    pub use crate::scoring::*;
}

pub mod routing {
    pub use crate::routing::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
