pub mod layout;
pub mod measurement;
pub mod slave;

pub use layout::{decode, Endianness, FieldSpec, FieldWidth, RegisterLayout};
pub use measurement::Measurement;
pub use slave::{SlaveDevice, SlaveState};
