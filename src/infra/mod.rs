pub mod json_output_adapter;

pub use json_output_adapter::JsonFileOutputAdapter;
