pub mod clean;
pub mod run;

pub use clean::*;
pub use run::*;
