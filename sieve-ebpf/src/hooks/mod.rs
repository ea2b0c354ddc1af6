mod open;
mod splice;

pub use open::*;
pub use splice::*;
