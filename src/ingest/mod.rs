pub mod records;
pub mod set_index;
pub mod store;
