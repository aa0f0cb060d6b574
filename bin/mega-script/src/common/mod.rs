mod error;
mod logging;
mod state;

pub use error::*;
pub use logging::*;
pub use state::*;
