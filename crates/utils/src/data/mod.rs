mod data;
pub use data::Data;

mod zeroed;
pub use zeroed::ZeroedData;
