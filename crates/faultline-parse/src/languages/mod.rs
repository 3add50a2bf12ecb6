pub mod c;
pub mod java;
pub mod python;
pub mod rust;
pub mod typescript;
