mod entities;
mod ports;
mod profile;

pub use entities::*;
pub use ports::*;
pub use profile::Profile;
