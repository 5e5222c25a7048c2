pub mod csv_log;

pub use csv_log::CsvLogWriter;
