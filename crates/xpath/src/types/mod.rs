//! The typed value model: atomic values, sequences, nodes-in-sequences,
//! maps, arrays and function items.

mod array;
mod atomic;
pub mod cast;
pub mod datetime;
mod function;
mod map;
mod sequence;

pub use array::XdmArray;
pub use atomic::{
    AtomicType, AtomicValue, base64_decode, base64_encode, double_to_string, hex_decode,
    hex_encode, string_to_double,
};
pub use function::XdmFunction;
pub use map::{MapKey, XdmMap};
pub use sequence::{XdmItem, XdmValue, sort_dedup_nodes};
