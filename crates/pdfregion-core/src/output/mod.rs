//! Tabular output.

mod writer;

pub use writer::{
    OutputLayout, TabularWriter, header_for, persist_atomic, to_bytes, write_atomic,
    write_json_atomic,
};
