//! Domain vocabulary shared between the agency core and its collaborators.

pub mod domain;
pub mod views;

pub use domain::*;
pub use views::*;
