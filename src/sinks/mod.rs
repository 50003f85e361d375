pub mod csv_sink;
pub mod opcua_sink;

pub use csv_sink::CsvSink;
pub use opcua_sink::{NodeMapper, OpcuaSink};
